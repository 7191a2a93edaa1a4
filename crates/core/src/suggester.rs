//! External suggestions: the typed record the engine consumes, lenient parsing of
//! model output, and the async seam suggestion sources plug into.

use crate::models::{clamp_confidence, FileSignature, NamingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_CATEGORY: &str = "Misc";
pub const DEFAULT_DESCRIPTION: &str = "file";
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "naming_strategy", rename_all = "kebab-case")]
pub enum Naming {
    UseOriginal,
    RefineOriginal { refined: String },
    UseNewDescription { description: String },
}

impl Naming {
    pub fn strategy(&self) -> NamingStrategy {
        match self {
            Naming::UseOriginal => NamingStrategy::UseOriginal,
            Naming::RefineOriginal { .. } => NamingStrategy::RefineOriginal,
            Naming::UseNewDescription { .. } => NamingStrategy::UseNewDescription,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesHint {
    pub name: String,
    pub number: Option<u32>,
}

/// A validated candidate categorization. Built once at the boundary; every field has
/// a usable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub category: String,
    pub naming: Naming,
    pub confidence: f64,
    pub series: Option<SeriesHint>,
    pub reasons: Vec<String>,
}

impl Default for Suggestion {
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            naming: Naming::UseNewDescription {
                description: DEFAULT_DESCRIPTION.to_string(),
            },
            confidence: DEFAULT_CONFIDENCE,
            series: None,
            reasons: Vec::new(),
        }
    }
}

impl Suggestion {
    pub fn new(category: impl Into<String>, naming: Naming, confidence: f64) -> Self {
        Self {
            category: category.into(),
            naming,
            confidence: clamp_confidence(confidence),
            ..Self::default()
        }
    }

    pub fn strategy(&self) -> NamingStrategy {
        self.naming.strategy()
    }

    /// The text the file name is built from.
    pub fn description_for(&self, signature: &FileSignature) -> String {
        match &self.naming {
            Naming::UseOriginal => signature.stem.clone(),
            Naming::RefineOriginal { refined } => refined.clone(),
            Naming::UseNewDescription { description } => description.clone(),
        }
    }

    /// Reads an untrusted JSON payload field by field. Missing or mistyped fields fall
    /// back to defaults; this never fails.
    pub fn from_value(value: &Value) -> Self {
        if !value.is_object() {
            return Self::default();
        }
        let text = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let category = text("context")
            .or_else(|| text("category"))
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let description = text("description").unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        let strategy = text("naming_strategy")
            .map(|s| s.to_lowercase().replace('_', "-"))
            .unwrap_or_default();
        let naming = match strategy.as_str() {
            "use-original" => Naming::UseOriginal,
            "refine-original" => Naming::RefineOriginal {
                refined: text("refined_from_original").unwrap_or(description),
            },
            _ => Naming::UseNewDescription { description },
        };

        let confidence = value
            .get("confidence")
            .and_then(number)
            .filter(|c| c.is_finite())
            .map(clamp_confidence)
            .unwrap_or(DEFAULT_CONFIDENCE);

        let reasons = value
            .get("confidence_reasons")
            .or_else(|| value.get("reasons"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let detection = value.get("series_detection");
        let is_series = value
            .get("is_series")
            .and_then(|v| v.as_bool())
            .or_else(|| detection.and_then(|d| d.get("is_series")).and_then(|v| v.as_bool()))
            .unwrap_or(false);
        let series_name = text("series_name").or_else(|| {
            detection
                .and_then(|d| d.get("series_name"))
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        let series = match (is_series, series_name) {
            (true, Some(name)) => Some(SeriesHint {
                name,
                number: value
                    .get("series_number")
                    .and_then(number)
                    .filter(|n| *n >= 1.0)
                    .map(|n| n as u32),
            }),
            _ => None,
        };

        Self {
            category,
            naming,
            confidence,
            series,
            reasons,
        }
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parses a model response into suggestions, repairing the usual damage: code fences,
/// prose around the JSON array, trailing commas and single quotes. Unparseable input
/// yields an empty list.
pub fn parse_suggestions(raw: &str) -> Vec<Suggestion> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let cleaned = cleaned.trim();
    match repair_json(cleaned) {
        Some(Value::Array(items)) => items.iter().map(Suggestion::from_value).collect(),
        Some(value @ Value::Object(_)) => vec![Suggestion::from_value(&value)],
        _ => {
            debug!(len = raw.len(), "could not parse suggestion payload");
            Vec::new()
        }
    }
}

fn repair_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    if let Some(value) = array_span(text).and_then(|s| serde_json::from_str(s).ok()) {
        return Some(value);
    }
    let fixed = strip_trailing_commas(text).replace('\'', "\"");
    if let Ok(value) = serde_json::from_str(&fixed) {
        return Some(value);
    }
    array_span(&fixed).and_then(|s| serde_json::from_str(s).ok())
}

/// Outermost `[...]` span.
fn array_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("suggestion source unavailable: {0}")]
    Unavailable(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Digest handed to a suggestion source alongside the files.
#[derive(Debug, Clone, Default)]
pub struct SuggestionContext {
    pub categories: String,
    pub corrections: String,
}

/// Anything that can propose categorizations for a batch of files. Implementations
/// return one slot per signature, in order.
#[async_trait::async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(
        &self,
        batch: &[FileSignature],
        context: &SuggestionContext,
    ) -> Result<Vec<Option<Suggestion>>, SourceError>;
}

/// Never suggests anything; decisions fall through to local signals.
#[derive(Debug, Default)]
pub struct NoopSource;

#[async_trait::async_trait]
impl SuggestionSource for NoopSource {
    async fn suggest(
        &self,
        batch: &[FileSignature],
        _context: &SuggestionContext,
    ) -> Result<Vec<Option<Suggestion>>, SourceError> {
        Ok(vec![None; batch.len()])
    }
}

/// Suggestions read from a JSON object keyed by file name, e.g. a saved model response.
#[derive(Debug, Default)]
pub struct StaticSource {
    by_file: HashMap<String, Suggestion>,
}

impl StaticSource {
    /// Accepts the same damage [`parse_suggestions`] repairs, as long as the
    /// top level is an object.
    pub fn from_json(text: &str) -> Result<Self, SourceError> {
        let cleaned = text.replace("```json", "").replace("```", "");
        let value = repair_json(cleaned.trim())
            .ok_or_else(|| SourceError::Unavailable("invalid suggestions document".into()))?;
        let map = value
            .as_object()
            .ok_or_else(|| SourceError::Unavailable("expected an object keyed by file name".into()))?;
        let by_file = map
            .iter()
            .map(|(name, raw)| (name.clone(), Suggestion::from_value(raw)))
            .collect();
        Ok(Self { by_file })
    }

    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Unavailable(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.by_file.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_file.is_empty()
    }
}

#[async_trait::async_trait]
impl SuggestionSource for StaticSource {
    async fn suggest(
        &self,
        batch: &[FileSignature],
        _context: &SuggestionContext,
    ) -> Result<Vec<Option<Suggestion>>, SourceError> {
        Ok(batch
            .iter()
            .map(|sig| self.by_file.get(&sig.file_name()).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_payload_defaults_every_field() {
        let s = Suggestion::from_value(&json!({}));
        assert_eq!(s, Suggestion::default());
        assert_eq!(s.category, "Misc");
        assert_eq!(s.strategy(), NamingStrategy::UseNewDescription);
        assert_eq!(s.confidence, 0.5);
    }

    #[test]
    fn mistyped_fields_degrade_individually() {
        let s = Suggestion::from_value(&json!({
            "context": 42,
            "description": "lab report",
            "confidence": "0.7",
            "naming_strategy": ["nope"],
            "confidence_reasons": ["clear title", 3],
        }));
        assert_eq!(s.category, "Misc");
        assert_eq!(s.confidence, 0.7);
        assert_eq!(
            s.naming,
            Naming::UseNewDescription {
                description: "lab report".into()
            }
        );
        assert_eq!(s.reasons, vec!["clear title".to_string()]);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        assert_eq!(Suggestion::from_value(&json!({"confidence": 4.2})).confidence, 1.0);
        assert_eq!(Suggestion::from_value(&json!({"confidence": -1})).confidence, 0.0);
        assert_eq!(Suggestion::from_value(&json!(null)).confidence, 0.5);
    }

    #[test]
    fn refine_prefers_refined_text() {
        let s = Suggestion::from_value(&json!({
            "naming_strategy": "refine-original",
            "context": "CS230P",
            "description": "binary tree",
            "refined_from_original": "binary-tree-hw",
        }));
        let sig = FileSignature::new("bt_hw", ".pdf");
        assert_eq!(s.description_for(&sig), "binary-tree-hw");

        let original = Suggestion::from_value(&json!({"naming_strategy": "use_original"}));
        assert_eq!(original.description_for(&sig), "bt_hw");
    }

    #[test]
    fn series_requires_flag_and_name() {
        let s = Suggestion::from_value(&json!({"is_series": true, "series_name": "hw", "series_number": 2}));
        assert_eq!(
            s.series,
            Some(SeriesHint {
                name: "hw".into(),
                number: Some(2)
            })
        );
        let nested = Suggestion::from_value(&json!({
            "series_detection": {"is_series": true, "series_name": "scan"}
        }));
        assert_eq!(nested.series.map(|h| h.name), Some("scan".to_string()));
        assert!(Suggestion::from_value(&json!({"series_name": "hw"})).series.is_none());
    }

    #[test]
    fn parses_fenced_and_damaged_responses() {
        let fenced = "```json\n[{\"context\": \"Finance\", \"confidence\": 0.9}]\n```";
        assert_eq!(parse_suggestions(fenced)[0].category, "Finance");

        let chatty = "Sure! Here you go:\n[{\"context\": \"Photos\"}]\nHope that helps.";
        assert_eq!(parse_suggestions(chatty)[0].category, "Photos");

        let damaged = "[{'context': 'Work', 'confidence': 0.8,},]";
        let parsed = parse_suggestions(damaged);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].category, "Work");
        assert_eq!(parsed[0].confidence, 0.8);

        assert!(parse_suggestions("no json here").is_empty());
    }

    #[test]
    fn static_source_tolerates_fences_and_trailing_commas() {
        let text = "```json\n{\"a.pdf\": {\"context\": \"Work\"},}\n```";
        let source = StaticSource::from_json(text).unwrap();
        assert_eq!(source.len(), 1);
        assert!(StaticSource::from_json("[1, 2]").is_err());
        assert!(StaticSource::from_json("nothing").is_err());
    }

    #[tokio::test]
    async fn static_source_matches_by_file_name() {
        let source = StaticSource::from_json(
            r#"{"receipt.pdf": {"context": "Finance", "confidence": 0.9}}"#,
        )
        .unwrap();
        let batch = vec![
            FileSignature::new("receipt", ".pdf"),
            FileSignature::new("other", ".pdf"),
        ];
        let out = source
            .suggest(&batch, &SuggestionContext::default())
            .await
            .unwrap();
        assert_eq!(out[0].as_ref().map(|s| s.category.as_str()), Some("Finance"));
        assert!(out[1].is_none());

        let none = NoopSource.suggest(&batch, &SuggestionContext::default()).await.unwrap();
        assert_eq!(none, vec![None, None]);
    }
}
