//! Walks a directory for supported files and groups them into folder batches.

use crate::config::ScanPaths;
use crate::models::normalize_extension;
use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Normalized extensions (`.pdf`). Empty accepts everything.
    pub extensions: Vec<String>,
    pub exclude: Vec<String>,
    /// Walk into dot-directories and keep dot-files.
    pub include_hidden: bool,
}

impl ScanOptions {
    pub fn from_config(scan: &ScanPaths, recursive: bool) -> Self {
        Self {
            recursive,
            extensions: scan.extensions.iter().map(|e| normalize_extension(e)).collect(),
            exclude: scan.exclude.clone(),
            include_hidden: scan.include_hidden,
        }
    }
}

/// Supported, non-hidden files under `root`, sorted by path.
pub fn scan(root: &Path, options: &ScanOptions) -> anyhow::Result<Vec<PathBuf>> {
    let exclude_set = build_globset(&options.exclude)?;
    let max_depth = if options.recursive { usize::MAX } else { 1 };

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0 || should_descend(e.path(), options.include_hidden, &exclude_set)
        })
    {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                debug!(%err, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_supported(path, &options.extensions) {
            files.push(path.to_path_buf());
        }
    }
    if files.is_empty() && !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FolderGroup {
    pub path: PathBuf,
    pub name: String,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouping {
    pub folders: Vec<FolderGroup>,
    /// Files directly in the scan root, plus files from folders too small to batch.
    pub loose: Vec<PathBuf>,
}

pub fn group_by_folder(files: &[PathBuf], root: &Path, min_files: usize) -> Grouping {
    let mut by_parent: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let mut grouping = Grouping::default();
    for file in files {
        match file.parent() {
            Some(parent) if parent != root => {
                by_parent.entry(parent.to_path_buf()).or_default().push(file.clone())
            }
            _ => grouping.loose.push(file.clone()),
        }
    }
    for (path, files) in by_parent {
        if files.len() >= min_files {
            let name = folder_name(&path);
            grouping.folders.push(FolderGroup { path, name, files });
        } else {
            grouping.loose.extend(files);
        }
    }
    grouping
}

pub fn folder_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_supported(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    let ext = path
        .extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default();
    extensions.iter().any(|e| *e == ext)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid exclude glob {pat:?}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(path: &Path, include_hidden: bool, excludes: &GlobSet) -> bool {
    if is_excluded(path, excludes) {
        return false;
    }
    if !include_hidden && is_hidden(path) {
        return false;
    }
    true
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn is_excluded(path: &Path, excludes: &GlobSet) -> bool {
    excludes.is_match(path)
}
