//! Destination names: `{year}-{season}__{category}__{description}{-NNN}{ext}` under
//! `{root}/{year}-{season}/{category}`.

use crate::timing::Timing;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Lower-cases and turns spaces and underscores into hyphens. Blank input becomes `file`.
pub fn clean_description(text: &str) -> String {
    let cleaned = text.trim().replace([' ', '_'], "-").to_lowercase();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

pub fn file_name(
    timing: Timing,
    category: &str,
    description: &str,
    series_number: Option<u32>,
    extension: &str,
) -> String {
    let suffix = series_number.map(|n| format!("-{n:03}")).unwrap_or_default();
    format!(
        "{}__{}__{}{}{}",
        timing.label(),
        category,
        clean_description(description),
        suffix,
        extension
    )
}

pub fn destination_folder(root: &Path, timing: Timing, category: &str) -> PathBuf {
    root.join(timing.label()).join(category)
}

/// Where a file would go. Planning only; nothing is moved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub folder: PathBuf,
    pub file_name: String,
    pub timing: Timing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_number: Option<u32>,
}

impl Placement {
    pub fn path(&self) -> PathBuf {
        self.folder.join(&self.file_name)
    }
}

/// `name.ext`, then `name(1).ext`, `name(2).ext`, ... until nothing exists at the path.
pub fn unique_path(folder: &Path, file_name: &str) -> PathBuf {
    let candidate = folder.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let as_path = Path::new(file_name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (1u32..)
        .map(|n| folder.join(format!("{stem}({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::Season;

    #[test]
    fn cleaning_rules() {
        assert_eq!(clean_description("Binary Tree_HW"), "binary-tree-hw");
        assert_eq!(clean_description("   "), "file");
        assert_eq!(clean_description("cs230-hw3"), "cs230-hw3");
    }

    #[test]
    fn file_name_layout() {
        let fall = Timing::new(2024, Season::Fall);
        assert_eq!(
            file_name(fall, "Academic", "cs230-hw3", None, ".pdf"),
            "2024-Fall__Academic__cs230-hw3.pdf"
        );
        assert_eq!(
            file_name(fall, "Photos", "beach trip", Some(7), ".jpg"),
            "2024-Fall__Photos__beach-trip-007.jpg"
        );
    }

    #[test]
    fn folder_layout() {
        let timing = Timing::new(2023, Season::Spring);
        assert_eq!(
            destination_folder(Path::new("Organized"), timing, "Finance"),
            PathBuf::from("Organized/2023-Spring/Finance")
        );
    }

    #[test]
    fn unique_path_appends_counter() {
        let temp = tempfile::tempdir().unwrap();
        let first = unique_path(temp.path(), "a.pdf");
        assert_eq!(first, temp.path().join("a.pdf"));
        std::fs::write(&first, "").unwrap();
        std::fs::write(temp.path().join("a(1).pdf"), "").unwrap();
        assert_eq!(unique_path(temp.path(), "a.pdf"), temp.path().join("a(2).pdf"));
    }
}
