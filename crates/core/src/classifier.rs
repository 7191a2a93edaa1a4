//! Folder-level inference: what a folder's name and the user's history say about
//! every file inside it.

use crate::categories::CategoryRegistry;
use crate::memory::{learned_confidence, PreferenceMemory};
use serde::Serialize;
use tracing::debug;

pub const EXACT_FOLDER_CONFIDENCE: f64 = 0.95;
pub const STRIPPED_FOLDER_CONFIDENCE: f64 = 0.85;
pub const SUBSTRING_FOLDER_CONFIDENCE: f64 = 0.75;
/// A folder resolution at or above this is applied to the whole folder without review.
pub const AUTO_APPLY_CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FolderSignal {
    /// Folder name equals a category, ignoring case.
    Exact,
    /// The user moved files from this folder to the same category repeatedly.
    Corroborated { count: u32 },
    /// Folder and category names overlap.
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderResolution {
    pub folder: String,
    pub category: String,
    pub confidence: f64,
    pub signal: FolderSignal,
}

impl FolderResolution {
    pub fn auto_apply(&self) -> bool {
        self.confidence >= AUTO_APPLY_CONFIDENCE
    }

    pub fn is_fuzzy(&self) -> bool {
        self.signal == FolderSignal::Fuzzy
    }

    pub fn reason(&self) -> String {
        match self.signal {
            FolderSignal::Exact => format!("folder '{}' matches category name", self.folder),
            FolderSignal::Corroborated { count } => {
                format!("learned from {count} corrections in folder '{}'", self.folder)
            }
            FolderSignal::Fuzzy => format!("inferred from folder name '{}'", self.folder),
        }
    }
}

/// Exact name match, then corroborated history, then name overlap.
pub fn infer_folder(
    folder: &str,
    registry: &CategoryRegistry,
    memory: &PreferenceMemory,
) -> Option<FolderResolution> {
    let folder_trimmed = folder.trim();
    if folder_trimmed.is_empty() {
        return None;
    }
    let categories = registry.all_categories();

    let resolution = exact_match(folder_trimmed, &categories)
        .or_else(|| {
            memory.corroborated_bias(folder).map(|(category, count)| FolderResolution {
                folder: folder_trimmed.to_string(),
                category,
                confidence: learned_confidence(count),
                signal: FolderSignal::Corroborated { count },
            })
        })
        .or_else(|| fuzzy_match(folder_trimmed, &categories));

    if let Some(r) = &resolution {
        debug!(folder, category = %r.category, confidence = r.confidence, "folder resolved");
    }
    resolution
}

pub fn exact_match(folder: &str, categories: &[&str]) -> Option<FolderResolution> {
    let folder_lower = folder.trim().to_lowercase();
    categories
        .iter()
        .find(|c| c.to_lowercase() == folder_lower)
        .map(|c| FolderResolution {
            folder: folder.to_string(),
            category: c.to_string(),
            confidence: EXACT_FOLDER_CONFIDENCE,
            signal: FolderSignal::Exact,
        })
}

/// Stripped containment (dashes, underscores and spaces removed) scores higher than a
/// plain substring match in either direction. Registry order breaks ties.
pub fn fuzzy_match(folder: &str, categories: &[&str]) -> Option<FolderResolution> {
    let folder_lower = folder.trim().to_lowercase();
    if folder_lower.is_empty() {
        return None;
    }
    let folder_stripped = strip_separators(&folder_lower);

    let stripped = categories.iter().find(|c| {
        let cat = strip_separators(&c.to_lowercase());
        !cat.is_empty() && folder_stripped.contains(&cat)
    });
    let (category, confidence) = match stripped {
        Some(c) => (c, STRIPPED_FOLDER_CONFIDENCE),
        None => {
            let c = categories.iter().find(|c| {
                let cat = c.to_lowercase();
                !cat.is_empty() && (cat.contains(&folder_lower) || folder_lower.contains(&cat))
            })?;
            (c, SUBSTRING_FOLDER_CONFIDENCE)
        }
    };
    Some(FolderResolution {
        folder: folder.to_string(),
        category: category.to_string(),
        confidence,
        signal: FolderSignal::Fuzzy,
    })
}

fn strip_separators(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '-' | '_' | ' ')).collect()
}
