//! Text and JSON rendering for plans and decisions.

use organizer_core::models::{ConfidenceLevel, Decision};
use organizer_core::naming::Placement;
use organizer_core::pipeline::{Plan, PlannedFile};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;

pub const DEFAULT_FIELDS: &[&str] = &[
    "path",
    "category",
    "confidence",
    "level",
    "source",
    "destination",
];

/// Keeps only the requested keys (case-insensitive) of each object.
pub fn filter_fields(mut results: Vec<Value>, fields: &[String]) -> Vec<Value> {
    if fields.is_empty() {
        return results;
    }
    let want: HashSet<String> = fields.iter().map(|s| s.to_lowercase()).collect();
    for r in results.iter_mut() {
        if let Some(obj) = r.as_object_mut() {
            let keep: serde_json::Map<String, Value> = obj
                .iter()
                .filter(|(k, _)| want.contains(&k.to_lowercase()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            *obj = keep;
        }
    }
    results
}

/// Splits comma-separated field lists, as given on the command line.
pub fn parse_fields(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|s| s.split(','))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn file_row(file: &PlannedFile, folder: Option<&str>) -> Value {
    let mut row = decision_row(&file.decision, &file.placement);
    if let Some(obj) = row.as_object_mut() {
        obj.insert("path".into(), json!(file.path.display().to_string()));
        obj.insert("level".into(), json!(file.level));
        obj.insert("batch".into(), json!(folder));
    }
    row
}

pub fn decision_row(decision: &Decision, placement: &Placement) -> Value {
    json!({
        "category": decision.category,
        "strategy": decision.strategy,
        "description": decision.description,
        "confidence": round2(decision.confidence),
        "source": decision.source(),
        "rule": decision.matched_rule,
        "series": decision.series,
        "reasons": decision.reasons,
        "alternatives": decision.alternatives,
        "destination": placement.path().display().to_string(),
    })
}

pub fn plan_rows(plan: &Plan) -> Vec<Value> {
    plan.folders
        .iter()
        .flat_map(|folder| {
            folder
                .files
                .iter()
                .map(move |file| file_row(file, Some(folder.name.as_str())))
        })
        .chain(plan.loose.iter().map(|file| file_row(file, None)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanSummary {
    pub files: usize,
    pub folders: usize,
    pub auto_folders: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub cached: usize,
    pub skipped: usize,
    pub suggestion_requests: usize,
}

impl PlanSummary {
    pub fn of(plan: &Plan) -> Self {
        let mut summary = Self {
            folders: plan.folders.len(),
            auto_folders: plan.folders.iter().filter(|f| f.auto_apply).count(),
            skipped: plan.skipped.len(),
            suggestion_requests: plan.suggestion_requests,
            ..Self::default()
        };
        for file in plan.files() {
            summary.files += 1;
            match file.level {
                ConfidenceLevel::High => summary.high += 1,
                ConfidenceLevel::Medium => summary.medium += 1,
                ConfidenceLevel::Low => summary.low += 1,
            }
            if file.decision.cached {
                summary.cached += 1;
            }
        }
        summary
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plan summary: files={}, folders={} (auto={}), high={}, medium={}, low={}, cached={}, skipped={}, requests={}",
            self.files,
            self.folders,
            self.auto_folders,
            self.high,
            self.medium,
            self.low,
            self.cached,
            self.skipped,
            self.suggestion_requests
        )
    }
}

pub fn decision_line(file_name: &str, decision: &Decision, placement: &Placement) -> String {
    format!(
        "{file_name} -> {} [{} {:.0}% via {}]",
        placement.path().display(),
        decision.category,
        decision.confidence * 100.0,
        decision.source()
    )
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_keeps_requested_keys_only() {
        let rows = vec![json!({"Path": "a", "category": "Work", "extra": 1})];
        let out = filter_fields(rows, &["path".into(), "CATEGORY".into()]);
        assert_eq!(out, vec![json!({"Path": "a", "category": "Work"})]);
    }

    #[test]
    fn empty_field_list_keeps_everything() {
        let rows = vec![json!({"a": 1})];
        assert_eq!(filter_fields(rows.clone(), &[]), rows);
    }

    #[test]
    fn fields_split_on_commas() {
        assert_eq!(
            parse_fields(&["path, category".into(), "level".into(), ",".into()]),
            vec!["path", "category", "level"]
        );
    }
}
