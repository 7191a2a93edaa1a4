//! Preference memory: the correction log and the learning tables derived from it.
//!
//! The folder and extension count tables are a pure function of the `context`
//! corrections still held in the log. They are maintained incrementally (including
//! subtracting records that age out of the log) and rebuilt from the log on load, so
//! [`PreferenceMemory::rebuild_aggregates`] never changes them.

use crate::bounded::BoundedLog;
use crate::config::MemoryConfig;
use crate::models::{CorrectionKind, CorrectionRecord, FileSignature};
use crate::timing::Timing;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use storage::Document;
use tracing::{debug, info, warn};

/// Preview characters kept with each correction.
const CORRECTION_PREVIEW_CHARS: usize = 200;
/// Corrections scanned when collecting recent matches for a file.
const RECENT_SCAN: usize = 50;
/// Corrections needed before a folder pattern is offered as a rule.
const RULE_SUGGESTION_MIN: u32 = 3;

/// key (folder or extension) → category → count.
pub type CountTable = BTreeMap<String, BTreeMap<String, u32>>;

/// Confidence for a folder whose bias was corroborated `count` times.
pub fn learned_confidence(count: u32) -> f64 {
    (0.75 + 0.05 * f64::from(count)).min(0.95)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionCorrection {
    pub original_stem: String,
    pub prior: String,
    pub chosen: String,
    pub folder: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub total_processed: u64,
    pub corrections_made: u64,
    pub auto_accepted: u64,
    pub pattern_matched: u64,
    pub cache_hits: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files_processed: u64,
    #[serde(default)]
    pub corrections: u64,
    #[serde(default)]
    pub auto_accepted: u64,
    #[serde(default)]
    pub pattern_matched: u64,
    #[serde(default)]
    pub accuracy: f64,
}

impl SessionSummary {
    fn started(at: DateTime<Utc>) -> Self {
        Self {
            started_at: at,
            ended_at: None,
            files_processed: 0,
            corrections: 0,
            auto_accepted: 0,
            pattern_matched: 0,
            accuracy: 0.0,
        }
    }
}

/// How an accepted file was resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Acceptance {
    pub auto: bool,
    pub pattern: bool,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternHint {
    pub category: String,
    pub count: u32,
}

/// Learned context for one file, used to bias a suggestion source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextHints {
    pub folder_hints: Vec<PatternHint>,
    pub extension_hints: Vec<PatternHint>,
    pub recent_corrections: Vec<CorrectionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyStats {
    pub overall_accuracy: f64,
    pub total_files: u64,
    pub corrections: u64,
    pub auto_accepted: u64,
    pub pattern_matched: u64,
    pub cache_hits: u64,
    pub recent_sessions: Vec<SessionSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSuggestionKind {
    FolderPattern,
    FilenamePattern,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSuggestion {
    pub kind: RuleSuggestionKind,
    pub pattern: String,
    pub strength: u32,
    pub reason: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MemoryDocument {
    corrections: Vec<CorrectionRecord>,
    description_patterns: Vec<DescriptionCorrection>,
    timing_patterns: BTreeMap<String, Timing>,
    stats: Counters,
    sessions: Vec<SessionSummary>,
}

/// On-disk shape. The count tables are written for people reading the file and are
/// ignored on load.
#[derive(Serialize)]
struct MemorySnapshot<'a> {
    corrections: &'a BoundedLog<CorrectionRecord>,
    folder_patterns: &'a CountTable,
    extension_patterns: &'a CountTable,
    description_patterns: &'a BoundedLog<DescriptionCorrection>,
    timing_patterns: &'a BTreeMap<String, Timing>,
    stats: &'a Counters,
    sessions: &'a BoundedLog<SessionSummary>,
}

pub struct PreferenceMemory {
    corrections: BoundedLog<CorrectionRecord>,
    descriptions: BoundedLog<DescriptionCorrection>,
    folder_patterns: CountTable,
    extension_patterns: CountTable,
    timings: BTreeMap<String, Timing>,
    stats: Counters,
    sessions: BoundedLog<SessionSummary>,
    current: Option<SessionSummary>,
    corroboration_threshold: u32,
    document: Document,
}

impl PreferenceMemory {
    pub fn open(mut document: Document, config: &MemoryConfig) -> Self {
        let doc: MemoryDocument = document.load();
        let mut memory = Self {
            corrections: BoundedLog::from_items(config.max_corrections, doc.corrections),
            descriptions: BoundedLog::from_items(
                config.max_description_corrections,
                doc.description_patterns,
            ),
            folder_patterns: CountTable::new(),
            extension_patterns: CountTable::new(),
            timings: doc.timing_patterns,
            stats: doc.stats,
            sessions: BoundedLog::from_items(config.max_sessions, doc.sessions),
            current: None,
            corroboration_threshold: config.corroboration_threshold,
            document,
        };
        memory.rebuild_aggregates();
        debug!(corrections = memory.corrections.len(), "preference memory loaded");
        memory
    }

    pub fn in_memory(config: &MemoryConfig) -> Self {
        Self::open(Document::in_memory(), config)
    }

    pub fn record_correction(
        &mut self,
        signature: &FileSignature,
        kind: CorrectionKind,
        prior: &str,
        chosen: &str,
    ) {
        self.record_correction_at(signature, kind, prior, chosen, Utc::now());
    }

    pub fn record_correction_at(
        &mut self,
        signature: &FileSignature,
        kind: CorrectionKind,
        prior: &str,
        chosen: &str,
        at: DateTime<Utc>,
    ) {
        let record = CorrectionRecord {
            timestamp: at,
            kind,
            prior: prior.to_string(),
            chosen: chosen.to_string(),
            file_name: signature.file_name(),
            folder: signature.folder.clone(),
            extension: signature.extension.clone(),
            preview: signature.preview.chars().take(CORRECTION_PREVIEW_CHARS).collect(),
        };

        match kind {
            CorrectionKind::Context => self.count(&record, 1),
            CorrectionKind::Description => {
                self.descriptions.push(DescriptionCorrection {
                    original_stem: signature.stem.clone(),
                    prior: prior.to_string(),
                    chosen: chosen.to_string(),
                    folder: signature.folder.clone(),
                });
            }
            CorrectionKind::Timestamp => {}
        }

        if let Some(evicted) = self.corrections.push(record) {
            if evicted.kind == CorrectionKind::Context {
                self.count(&evicted, -1);
            }
        }

        self.stats.corrections_made += 1;
        if let Some(session) = self.current.as_mut() {
            session.corrections += 1;
        }
        debug!(?kind, folder = %signature.folder, chosen, "recorded correction");
        self.persist();
    }

    /// Recomputes the count tables by replaying the retained log.
    pub fn rebuild_aggregates(&mut self) {
        self.folder_patterns.clear();
        self.extension_patterns.clear();
        let context: Vec<CorrectionRecord> = self
            .corrections
            .iter()
            .filter(|r| r.kind == CorrectionKind::Context)
            .cloned()
            .collect();
        for record in &context {
            self.count(record, 1);
        }
    }

    pub fn folder_patterns(&self) -> &CountTable {
        &self.folder_patterns
    }

    pub fn extension_patterns(&self) -> &CountTable {
        &self.extension_patterns
    }

    pub fn corrections(&self) -> impl DoubleEndedIterator<Item = &CorrectionRecord> {
        self.corrections.iter()
    }

    pub fn correction_count(&self) -> usize {
        self.corrections.len()
    }

    pub fn description_corrections(&self) -> impl DoubleEndedIterator<Item = &DescriptionCorrection> {
        self.descriptions.iter()
    }

    /// Most frequent category for a folder; equal counts resolve to the
    /// lexicographically smallest label.
    pub fn folder_bias(&self, folder: &str) -> Option<(String, u32)> {
        let mut best: Option<(&String, u32)> = None;
        for (category, &count) in self.folder_patterns.get(folder)? {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((category, count));
            }
        }
        best.map(|(category, count)| (category.clone(), count))
    }

    /// Folder bias that meets the corroboration threshold.
    pub fn corroborated_bias(&self, folder: &str) -> Option<(String, u32)> {
        self.folder_bias(folder)
            .filter(|(_, count)| *count >= self.corroboration_threshold)
    }

    pub fn corroboration_threshold(&self) -> u32 {
        self.corroboration_threshold
    }

    /// Timing the user set explicitly for a category.
    pub fn timing_for(&self, category: &str) -> Option<Timing> {
        self.timings.get(category).copied()
    }

    pub fn record_timing(&mut self, category: &str, timing: Timing) {
        self.timings.insert(category.to_string(), timing);
        info!(category, timing = %timing.label(), "recorded timing override");
        self.persist();
    }

    pub fn relevant_context(&self, signature: &FileSignature) -> ContextHints {
        let matches = |record: &&CorrectionRecord| {
            (!signature.folder.is_empty() && record.folder == signature.folder)
                || (!signature.extension.is_empty() && record.extension == signature.extension)
        };
        ContextHints {
            folder_hints: top_hints(&self.folder_patterns, &signature.folder, 3),
            extension_hints: top_hints(&self.extension_patterns, &signature.extension, 3),
            recent_corrections: self
                .corrections
                .tail(RECENT_SCAN)
                .rev()
                .filter(matches)
                .take(5)
                .cloned()
                .collect(),
        }
    }

    /// Digest of what the user has taught so far, for a suggestion source. Folders in
    /// `signatures` are listed first. Empty when nothing was corrected yet.
    pub fn prompt_context(&self, signatures: &[FileSignature]) -> String {
        if self.corrections.is_empty() {
            return String::new();
        }
        let mut parts =
            vec!["\nUSER CORRECTION HISTORY (learn from these to improve suggestions):".to_string()];

        if !self.folder_patterns.is_empty() {
            parts.push("\nFolder → Category mappings (user preferences):".to_string());
            let batch: HashSet<&str> = signatures.iter().map(|s| s.folder.as_str()).collect();
            let (first, rest): (Vec<_>, Vec<_>) = self
                .folder_patterns
                .keys()
                .partition(|folder| batch.contains(folder.as_str()));
            for folder in first.into_iter().chain(rest).take(10) {
                if let Some((category, count)) = self.folder_bias(folder) {
                    parts.push(format!(
                        "  - Files from '{folder}' → usually '{category}' ({count}x)"
                    ));
                }
            }
        }

        parts.push("\nRecent user corrections (AI was wrong, user fixed):".to_string());
        for record in self.corrections.tail(10) {
            match record.kind {
                CorrectionKind::Context => parts.push(format!(
                    "  - '{}': AI said '{}' → user chose '{}'",
                    record.file_name, record.prior, record.chosen
                )),
                CorrectionKind::Description => parts.push(format!(
                    "  - '{}': AI desc '{}' → user preferred '{}'",
                    record.file_name, record.prior, record.chosen
                )),
                CorrectionKind::Timestamp => {}
            }
        }

        parts.push(format!(
            "\nStats: {} files processed, {} corrections made",
            self.stats.total_processed, self.stats.corrections_made
        ));
        parts.join("\n")
    }

    pub fn record_acceptance(&mut self, acceptance: Acceptance) {
        self.stats.total_processed += 1;
        if acceptance.auto {
            self.stats.auto_accepted += 1;
        }
        if acceptance.pattern {
            self.stats.pattern_matched += 1;
        }
        if acceptance.cached {
            self.stats.cache_hits += 1;
        }
        if let Some(session) = self.current.as_mut() {
            session.files_processed += 1;
            session.auto_accepted += u64::from(acceptance.auto);
            session.pattern_matched += u64::from(acceptance.pattern);
        }
        self.persist();
    }

    pub fn start_session(&mut self, at: DateTime<Utc>) {
        self.current = Some(SessionSummary::started(at));
    }

    /// Closes the running session, computing its accuracy. No-op without one.
    pub fn end_session(&mut self, at: DateTime<Utc>) -> Option<SessionSummary> {
        let mut session = self.current.take()?;
        session.ended_at = Some(at);
        session.accuracy = accuracy(session.files_processed, session.corrections);
        self.sessions.push(session.clone());
        info!(
            files = session.files_processed,
            accuracy = session.accuracy,
            "session closed"
        );
        self.persist();
        Some(session)
    }

    pub fn stats(&self) -> &Counters {
        &self.stats
    }

    pub fn accuracy_stats(&self) -> AccuracyStats {
        AccuracyStats {
            overall_accuracy: accuracy(self.stats.total_processed, self.stats.corrections_made),
            total_files: self.stats.total_processed,
            corrections: self.stats.corrections_made,
            auto_accepted: self.stats.auto_accepted,
            pattern_matched: self.stats.pattern_matched,
            cache_hits: self.stats.cache_hits,
            recent_sessions: self.sessions.tail(5).cloned().collect(),
        }
    }

    /// Candidate rules mined from repeated corrections, strongest evidence first.
    pub fn suggest_pattern_rules(&self) -> Vec<RuleSuggestion> {
        let mut suggestions = Vec::new();

        for (folder, categories) in &self.folder_patterns {
            for (category, &count) in categories {
                if count >= RULE_SUGGESTION_MIN {
                    suggestions.push(RuleSuggestion {
                        kind: RuleSuggestionKind::FolderPattern,
                        pattern: format!("Files from '{folder}' → '{category}'"),
                        strength: count,
                        reason: format!("You've corrected this {count} times"),
                    });
                }
            }
        }

        if self.descriptions.len() >= 5 {
            let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
            for correction in self.descriptions.tail(20) {
                let stem = correction.original_stem.to_lowercase();
                let key = stem.split('_').next().unwrap_or_default().trim().to_string();
                if !key.is_empty() {
                    groups.entry(key).or_default().push(correction.chosen.as_str());
                }
            }
            for (key, chosen) in groups {
                let uniform = chosen.windows(2).all(|w| w[0] == w[1]);
                if chosen.len() >= 3 && uniform {
                    suggestions.push(RuleSuggestion {
                        kind: RuleSuggestionKind::FilenamePattern,
                        pattern: format!("Files starting with '{key}' → '{}'", chosen[0]),
                        strength: chosen.len() as u32,
                        reason: format!("Detected pattern in {} files", chosen.len()),
                    });
                }
            }
        }

        suggestions.sort_by(|a, b| b.strength.cmp(&a.strength));
        suggestions.truncate(5);
        suggestions
    }

    pub fn persistence_warning(&self) -> Option<&str> {
        self.document.warning()
    }

    fn count(&mut self, record: &CorrectionRecord, delta: i64) {
        bump(&mut self.folder_patterns, &record.folder, &record.chosen, delta);
        bump(&mut self.extension_patterns, &record.extension, &record.chosen, delta);
    }

    fn persist(&mut self) {
        let snapshot = MemorySnapshot {
            corrections: &self.corrections,
            folder_patterns: &self.folder_patterns,
            extension_patterns: &self.extension_patterns,
            description_patterns: &self.descriptions,
            timing_patterns: &self.timings,
            stats: &self.stats,
            sessions: &self.sessions,
        };
        if let Err(err) = self.document.save(&snapshot) {
            warn!(%err, "could not save memory, continuing in memory");
        }
    }
}

fn bump(table: &mut CountTable, key: &str, category: &str, delta: i64) {
    if key.is_empty() || category.is_empty() {
        return;
    }
    let counts = table.entry(key.to_string()).or_default();
    let current = i64::from(counts.get(category).copied().unwrap_or(0));
    let next = (current + delta).max(0) as u32;
    if next == 0 {
        counts.remove(category);
    } else {
        counts.insert(category.to_string(), next);
    }
    if counts.is_empty() {
        table.remove(key);
    }
}

fn top_hints(table: &CountTable, key: &str, n: usize) -> Vec<PatternHint> {
    let Some(counts) = table.get(key) else {
        return Vec::new();
    };
    let mut hints: Vec<PatternHint> = counts
        .iter()
        .map(|(category, &count)| PatternHint {
            category: category.clone(),
            count,
        })
        .collect();
    // Stable sort keeps label order among equal counts.
    hints.sort_by(|a, b| b.count.cmp(&a.count));
    hints.truncate(n);
    hints
}

/// Percentage of files that needed no correction, one decimal, never negative.
fn accuracy(total: u64, corrections: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = (total.saturating_sub(corrections)) as f64 / total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}
