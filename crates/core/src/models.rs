use crate::config::Thresholds;
use crate::suggester::DEFAULT_CATEGORY;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Ceiling for any confidence the engine derives on its own. Only manual overrides
/// may go above it.
pub const MAX_DERIVED_CONFIDENCE: f64 = 0.95;

/// Clamps into [0, 1]; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Lower-cased extension with a leading dot, or empty.
pub fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    if ext.is_empty() {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Per-file descriptor used for cache keys and pattern matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    pub stem: String,
    pub extension: String,
    pub size: u64,
    pub folder: String,
    pub preview: String,
    /// Only used to place the file in a year/season folder; not part of the cache key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl FileSignature {
    pub fn new(stem: impl Into<String>, extension: &str) -> Self {
        Self {
            stem: stem.into(),
            extension: normalize_extension(extension),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = preview.into();
        self
    }

    pub fn created_at(mut self, created: DateTime<Utc>) -> Self {
        self.created = Some(created);
        self
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.stem, self.extension)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamingStrategy {
    UseOriginal,
    RefineOriginal,
    #[default]
    UseNewDescription,
}

impl NamingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            NamingStrategy::UseOriginal => "use-original",
            NamingStrategy::RefineOriginal => "refine-original",
            NamingStrategy::UseNewDescription => "use-new-description",
        }
    }
}

impl fmt::Display for NamingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which signal produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Cache,
    Pattern,
    LearnedFolder,
    Ai,
    ManualOverride,
}

impl Provenance {
    /// Higher wins. `Cache` has no rank of its own: a cached decision keeps the
    /// provenance it was produced with.
    pub fn trust_rank(self) -> u8 {
        match self {
            Provenance::ManualOverride => 4,
            Provenance::LearnedFolder => 3,
            Provenance::Pattern => 2,
            Provenance::Ai => 1,
            Provenance::Cache => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Cache => "cache",
            Provenance::Pattern => "pattern",
            Provenance::LearnedFolder => "learned-folder",
            Provenance::Ai => "ai",
            Provenance::ManualOverride => "manual-override",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A losing signal kept alongside the decision for the review UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub category: String,
    pub confidence: f64,
    pub provenance: Provenance,
}

/// The engine's final answer for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub category: String,
    pub strategy: NamingStrategy,
    pub description: String,
    pub confidence: f64,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_rule: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Candidate>,
    /// Set when the decision was served from the result cache.
    #[serde(default)]
    pub cached: bool,
}

impl Decision {
    pub fn new(
        category: impl Into<String>,
        strategy: NamingStrategy,
        description: impl Into<String>,
        confidence: f64,
        provenance: Provenance,
    ) -> Self {
        let category: String = category.into();
        let trimmed = category.trim();
        let category = if trimmed.is_empty() {
            DEFAULT_CATEGORY.to_string()
        } else {
            trimmed.to_string()
        };
        Self {
            category,
            strategy,
            description: description.into(),
            confidence: clamp_confidence(confidence),
            provenance,
            series: None,
            matched_rule: None,
            reasons: Vec::new(),
            alternatives: Vec::new(),
            cached: false,
        }
    }

    /// Provenance as reported to callers: `cache` for cache hits.
    pub fn source(&self) -> Provenance {
        if self.cached {
            Provenance::Cache
        } else {
            self.provenance
        }
    }

    pub fn level(&self, thresholds: &Thresholds) -> ConfidenceLevel {
        ConfidenceLevel::classify(self.confidence, thresholds)
    }

    pub fn is_auto_accept(&self, thresholds: &Thresholds) -> bool {
        self.level(thresholds) == ConfidenceLevel::High
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn classify(confidence: f64, thresholds: &Thresholds) -> Self {
        if confidence >= thresholds.accept {
            ConfidenceLevel::High
        } else if confidence >= thresholds.review {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionKind {
    Context,
    Description,
    Timestamp,
}

#[derive(Debug, Error)]
#[error("unknown correction kind: {0}")]
pub struct ParseCorrectionKindError(String);

impl FromStr for CorrectionKind {
    type Err = ParseCorrectionKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "context" | "category" => Ok(CorrectionKind::Context),
            "description" => Ok(CorrectionKind::Description),
            "timestamp" | "timing" => Ok(CorrectionKind::Timestamp),
            other => Err(ParseCorrectionKindError(other.to_string())),
        }
    }
}

/// One user correction. Never mutated once logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub timestamp: DateTime<Utc>,
    pub kind: CorrectionKind,
    pub prior: String,
    pub chosen: String,
    pub file_name: String,
    pub folder: String,
    pub extension: String,
    #[serde(default)]
    pub preview: String,
}
