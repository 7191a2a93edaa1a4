//! Builds [`FileSignature`]s from files on disk.

use crate::models::{normalize_extension, FileSignature};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::warn;

pub const PREVIEW_CHARS: usize = 500;
pub const NO_PREVIEW: &str = "No preview available";
const TEXT_EXTENSIONS: &[&str] = &[".txt", ".md", ".csv"];

pub fn signature_for(path: &Path) -> anyhow::Result<FileSignature> {
    let meta = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default();
    let folder = path
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let created = meta
        .created()
        .or_else(|_| meta.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    let preview = if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        read_preview(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), %err, "could not read preview");
            NO_PREVIEW.to_string()
        })
    } else {
        NO_PREVIEW.to_string()
    };

    let mut signature = FileSignature::new(stem, &extension)
        .with_size(meta.len())
        .in_folder(folder)
        .with_preview(preview);
    signature.created = created;
    Ok(signature)
}

/// First characters of a text file, decoding lossily.
fn read_preview(path: &Path) -> anyhow::Result<String> {
    let mut file = fs::File::open(path)?;
    // Four bytes per char is the UTF-8 worst case.
    let mut buf = vec![0u8; PREVIEW_CHARS * 4];
    let n = file.read(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf[..n])
        .chars()
        .take(PREVIEW_CHARS)
        .collect())
}

/// Extracts signatures on the blocking pool. Output order matches `paths`; files that
/// vanished or could not be read come back as `None`.
pub async fn extract_signatures(paths: &[PathBuf]) -> Vec<Option<FileSignature>> {
    let mut set = JoinSet::new();
    for (i, path) in paths.iter().cloned().enumerate() {
        set.spawn_blocking(move || (i, signature_for(&path)));
    }

    let mut out: Vec<Option<FileSignature>> = vec![None; paths.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((i, Ok(signature))) => out[i] = Some(signature),
            Ok((i, Err(err))) => warn!(path = %paths[i].display(), %err, "skipping file"),
            Err(err) => warn!(%err, "extraction task failed"),
        }
    }
    out
}
