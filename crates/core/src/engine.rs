//! The decision engine: merges cache, folder, pattern and suggestion signals into one
//! confidence-scored [`Decision`] per file.
//!
//! Resolution order:
//! 0. a manual folder hint (user picked the category for the whole folder)
//! 1. a live cache entry, returned verbatim
//! 2. folder name equal to a category (0.95)
//! 3. a folder bias corroborated by repeated corrections
//! 4. folder and category names overlapping (0.85 / 0.75)
//! 5. a filename rule
//! 6. the supplied suggestion
//! 7. the degraded fallback (`Misc`, 0.3)
//!
//! Steps 0, 5 and 6 are written back to the cache. Folder-level results depend on the
//! batch rather than the file and the fallback carries no signal, so neither is cached.

use crate::cache::ResultCache;
use crate::categories::CategoryRegistry;
use crate::classifier::{infer_folder, FolderResolution};
use crate::config::{AppConfig, Thresholds};
use crate::memory::{Acceptance, PreferenceMemory};
use crate::models::{
    Candidate, CorrectionKind, Decision, FileSignature, NamingStrategy, Provenance,
    MAX_DERIVED_CONFIDENCE,
};
use crate::naming::{self, Placement};
use crate::rules::PatternRuleMatcher;
use crate::series::SeriesTracker;
use crate::suggester::{Suggestion, DEFAULT_CATEGORY, DEFAULT_DESCRIPTION};
use crate::timing::Timing;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use storage::Document;
use tracing::{debug, info};

pub const FALLBACK_CONFIDENCE: f64 = 0.3;
pub const MANUAL_CONFIDENCE: f64 = 1.0;
/// Added per independent signal that agrees with the winning category.
pub const AGREEMENT_BOOST: f64 = 0.05;

/// Folder-level knowledge handed in by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum FolderHint {
    /// The user chose this category for every file in the folder.
    Manual(String),
    /// Folder inference already ran for this batch and found something.
    Resolved(FolderResolution),
    /// Folder inference already ran for this batch and found nothing.
    Inconclusive,
}

/// The three durable stores the engine works against.
pub struct Stores {
    pub cache: ResultCache,
    pub categories: CategoryRegistry,
    pub memory: PreferenceMemory,
}

impl Stores {
    /// Opens the documents named in the config. Unreadable files start empty.
    pub fn open(config: &AppConfig) -> Self {
        Self {
            cache: ResultCache::open(Document::at(&config.stores.cache_path), &config.cache),
            categories: CategoryRegistry::open(Document::at(&config.stores.categories_path)),
            memory: PreferenceMemory::open(Document::at(&config.stores.memory_path), &config.memory),
        }
    }

    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            cache: ResultCache::in_memory(&config.cache),
            categories: CategoryRegistry::in_memory(),
            memory: PreferenceMemory::in_memory(&config.memory),
        }
    }

    /// Warnings from stores that fell back to memory-only operation.
    pub fn persistence_warnings(&self) -> Vec<String> {
        [
            self.cache.persistence_warning(),
            self.categories.persistence_warning(),
            self.memory.persistence_warning(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub thresholds: Thresholds,
    pub destination_root: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            thresholds: config.classification.thresholds.clone(),
            destination_root: PathBuf::from(&config.naming.destination_root),
        }
    }
}

/// A signal that took part in a decision, winner or not.
struct Signal {
    category: String,
    confidence: f64,
    provenance: Provenance,
    fuzzy_folder: bool,
}

impl Signal {
    fn candidate(&self) -> Candidate {
        Candidate {
            category: self.category.clone(),
            confidence: self.confidence,
            provenance: self.provenance,
        }
    }
}

pub struct DecisionEngine {
    stores: Stores,
    rules: PatternRuleMatcher,
    series: SeriesTracker,
    settings: EngineSettings,
}

impl DecisionEngine {
    pub fn new(stores: Stores, rules: PatternRuleMatcher, settings: EngineSettings) -> Self {
        Self {
            stores,
            rules,
            series: SeriesTracker::new(),
            settings,
        }
    }

    /// Engine over the on-disk stores named in `config`, with the built-in rules.
    pub fn open(config: &AppConfig) -> Self {
        Self::new(
            Stores::open(config),
            PatternRuleMatcher::builtin(),
            EngineSettings::from(config),
        )
    }

    /// Hands the stores back. Series numbering ends with the engine.
    pub fn release(self) -> Stores {
        self.stores
    }

    pub fn cache(&self) -> &ResultCache {
        &self.stores.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResultCache {
        &mut self.stores.cache
    }

    pub fn categories(&self) -> &CategoryRegistry {
        &self.stores.categories
    }

    pub fn categories_mut(&mut self) -> &mut CategoryRegistry {
        &mut self.stores.categories
    }

    pub fn memory(&self) -> &PreferenceMemory {
        &self.stores.memory
    }

    pub fn memory_mut(&mut self) -> &mut PreferenceMemory {
        &mut self.stores.memory
    }

    pub fn rules(&self) -> &PatternRuleMatcher {
        &self.rules
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn series(&self) -> &SeriesTracker {
        &self.series
    }

    pub fn persistence_warnings(&self) -> Vec<String> {
        self.stores.persistence_warnings()
    }

    /// Folder-level signal (steps 2-4) for a folder name.
    pub fn resolve_folder(&self, folder: &str) -> Option<FolderResolution> {
        infer_folder(folder, &self.stores.categories, &self.stores.memory)
    }

    /// Always produces a decision.
    pub fn decide(
        &mut self,
        signature: &FileSignature,
        suggestion: Option<&Suggestion>,
        hint: Option<&FolderHint>,
    ) -> Decision {
        self.resolve(signature, suggestion, hint)
            .unwrap_or_else(|| self.fallback(signature))
    }

    /// Everything except the suggestion and the fallback. `None` means the caller
    /// should fetch a suggestion for this file.
    pub fn try_resolve_local(
        &mut self,
        signature: &FileSignature,
        hint: Option<&FolderHint>,
    ) -> Option<Decision> {
        self.resolve(signature, None, hint)
    }

    /// Decides a group of files, running folder inference once per distinct folder.
    /// `suggestions` is matched to `signatures` by position; missing slots count as
    /// no suggestion.
    pub fn decide_batch(
        &mut self,
        signatures: &[FileSignature],
        suggestions: &[Option<Suggestion>],
    ) -> Vec<Decision> {
        let mut folders: HashMap<String, FolderHint> = HashMap::new();
        signatures
            .iter()
            .enumerate()
            .map(|(i, signature)| {
                let hint = folders
                    .entry(signature.folder.clone())
                    .or_insert_with(|| match self.resolve_folder(&signature.folder) {
                        Some(resolution) => FolderHint::Resolved(resolution),
                        None => FolderHint::Inconclusive,
                    })
                    .clone();
                let suggestion = suggestions.get(i).and_then(Option::as_ref);
                self.decide(signature, suggestion, Some(&hint))
            })
            .collect()
    }

    fn resolve(
        &mut self,
        signature: &FileSignature,
        suggestion: Option<&Suggestion>,
        hint: Option<&FolderHint>,
    ) -> Option<Decision> {
        let folder = match hint {
            Some(FolderHint::Manual(category)) => {
                let decision = self.manual(signature, category, None);
                self.stores.cache.store(signature, &decision);
                return Some(decision);
            }
            Some(FolderHint::Resolved(resolution)) => Some(resolution.clone()),
            Some(FolderHint::Inconclusive) => None,
            None => None,
        };

        if let Some(mut hit) = self.stores.cache.lookup(signature) {
            debug!(file = %signature.file_name(), "cache hit");
            hit.cached = true;
            return Some(hit);
        }

        let folder = match hint {
            Some(_) => folder,
            None => self.resolve_folder(&signature.folder),
        };
        let pattern = self.rules.match_signature(signature);

        let mut signals: Vec<Signal> = Vec::new();
        if let Some(f) = &folder {
            signals.push(Signal {
                category: f.category.clone(),
                confidence: f.confidence,
                provenance: Provenance::LearnedFolder,
                fuzzy_folder: f.is_fuzzy(),
            });
        }
        if let Some(p) = &pattern {
            signals.push(Signal {
                category: p.category.clone(),
                confidence: p.confidence,
                provenance: Provenance::Pattern,
                fuzzy_folder: false,
            });
        }
        if let Some(s) = suggestion {
            signals.push(Signal {
                category: s.category.clone(),
                confidence: s.confidence,
                provenance: Provenance::Ai,
                fuzzy_folder: false,
            });
        }
        if signals.is_empty() {
            return None;
        }

        // Signals are pushed in resolution order, so the first is the winner.
        let winner = &signals[0];
        let mut decision = match winner.provenance {
            Provenance::LearnedFolder => {
                let mut d = Decision::new(
                    &winner.category,
                    NamingStrategy::RefineOriginal,
                    &signature.stem,
                    winner.confidence,
                    Provenance::LearnedFolder,
                );
                if let Some(f) = &folder {
                    d.reasons.push(f.reason());
                }
                d
            }
            Provenance::Pattern => {
                let mut d = Decision::new(
                    &winner.category,
                    NamingStrategy::RefineOriginal,
                    &signature.stem,
                    winner.confidence,
                    Provenance::Pattern,
                );
                if let Some(p) = &pattern {
                    d.matched_rule = Some(p.pattern.clone());
                    d.reasons.push(format!("filename matches rule '{}'", p.pattern));
                }
                d
            }
            _ => {
                // Only the suggestion remains.
                let s = suggestion?;
                let mut d = Decision::new(
                    &s.category,
                    s.strategy(),
                    s.description_for(signature),
                    s.confidence,
                    Provenance::Ai,
                );
                d.reasons.extend(s.reasons.iter().cloned());
                d
            }
        };

        if let Some(s) = suggestion {
            if s.category.eq_ignore_ascii_case(&decision.category) {
                decision.series = s.series.as_ref().map(|hint| hint.name.clone());
            }
        }

        let agreeing = signals[1..]
            .iter()
            .filter(|s| {
                (s.provenance != Provenance::LearnedFolder || s.fuzzy_folder)
                    && s.category.eq_ignore_ascii_case(&decision.category)
            })
            .count();
        let base = decision.confidence.min(MAX_DERIVED_CONFIDENCE);
        decision.confidence =
            (base + AGREEMENT_BOOST * agreeing as f64).min(MAX_DERIVED_CONFIDENCE).max(base);
        if agreeing > 0 {
            decision
                .reasons
                .push(format!("{agreeing} independent signal(s) agree"));
        }

        let mut alternatives: Vec<Candidate> = signals[1..]
            .iter()
            .filter(|s| !s.category.eq_ignore_ascii_case(&decision.category))
            .map(Signal::candidate)
            .collect();
        if let Some((category, confidence)) = self.rules.extension_hint(signature) {
            alternatives.push(Candidate {
                category,
                confidence,
                provenance: Provenance::Pattern,
            });
        }
        decision.alternatives = rank_alternatives(alternatives, &decision.category);

        if matches!(decision.provenance, Provenance::Pattern | Provenance::Ai) {
            self.stores.cache.store(signature, &decision);
        }
        debug!(
            file = %signature.file_name(),
            category = %decision.category,
            confidence = decision.confidence,
            provenance = %decision.provenance,
            "decided"
        );
        Some(decision)
    }

    fn fallback(&self, signature: &FileSignature) -> Decision {
        let mut decision = Decision::new(
            DEFAULT_CATEGORY,
            NamingStrategy::UseNewDescription,
            DEFAULT_DESCRIPTION,
            FALLBACK_CONFIDENCE,
            Provenance::Ai,
        );
        decision.reasons.push("no signal available".to_string());
        if let Some((category, confidence)) = self.rules.extension_hint(signature) {
            decision.alternatives = rank_alternatives(
                vec![Candidate {
                    category,
                    confidence,
                    provenance: Provenance::Pattern,
                }],
                DEFAULT_CATEGORY,
            );
        }
        debug!(file = %signature.file_name(), "no signal, falling back");
        decision
    }

    fn manual(&self, signature: &FileSignature, category: &str, prior: Option<&Decision>) -> Decision {
        let (strategy, description, series) = match prior {
            Some(p) => (p.strategy, p.description.clone(), p.series.clone()),
            None => (NamingStrategy::RefineOriginal, signature.stem.clone(), None),
        };
        let mut decision = Decision::new(
            category,
            strategy,
            description,
            MANUAL_CONFIDENCE,
            Provenance::ManualOverride,
        );
        decision.series = series;
        decision.reasons.push("chosen by user".to_string());
        decision
    }

    /// The user replaced `prior`'s category. Logs a context correction when the
    /// category actually changed and caches the overriding decision.
    pub fn apply_override(
        &mut self,
        signature: &FileSignature,
        prior: &Decision,
        category: &str,
    ) -> Decision {
        let decision = self.manual(signature, category, Some(prior));
        if prior.category != decision.category {
            self.stores.memory.record_correction(
                signature,
                CorrectionKind::Context,
                &prior.category,
                &decision.category,
            );
        }
        self.stores.cache.store(signature, &decision);
        info!(
            file = %signature.file_name(),
            from = %prior.category,
            to = %decision.category,
            "manual override"
        );
        decision
    }

    pub fn record_correction(
        &mut self,
        signature: &FileSignature,
        kind: CorrectionKind,
        prior: &str,
        chosen: &str,
    ) {
        self.stores.memory.record_correction(signature, kind, prior, chosen);
    }

    /// Counts an accepted decision towards the memory statistics.
    pub fn record_acceptance(&mut self, decision: &Decision) {
        let acceptance = Acceptance {
            auto: decision.is_auto_accept(&self.settings.thresholds),
            pattern: decision.provenance == Provenance::Pattern && !decision.cached,
            cached: decision.cached,
        };
        self.stores.memory.record_acceptance(acceptance);
    }

    /// Registry timing first, then the user's explicit override in memory.
    pub fn timing_for(&self, category: &str) -> Option<Timing> {
        self.stores
            .categories
            .timing_for(category)
            .or_else(|| self.stores.memory.timing_for(category))
    }

    /// Records a user's year/season for a category where [`Self::timing_for`] will see
    /// it: the registry when it already times the label, memory otherwise. Returns the
    /// timing now in effect.
    pub fn override_timing(&mut self, category: &str, timing: Timing) -> Timing {
        if self.stores.categories.timing_for(category).is_some() {
            self.stores.categories.record_timing(category, timing);
        } else {
            self.stores.memory.record_timing(category, timing);
        }
        self.timing_for(category).unwrap_or(timing)
    }

    /// Category timing, else the file's creation time, else `now`.
    pub fn timing_of(&self, signature: &FileSignature, decision: &Decision, now: DateTime<Utc>) -> Timing {
        self.timing_for(&decision.category)
            .unwrap_or_else(|| Timing::of(&signature.created.unwrap_or(now)))
    }

    /// Next number in a series for this run.
    pub fn register_series(&mut self, name: &str, file_name: &str) -> u32 {
        self.series.register(name, file_name)
    }

    /// Destination for a decided file. Registers the file with its series, so call it
    /// once per file.
    pub fn place(&mut self, signature: &FileSignature, decision: &Decision) -> Placement {
        self.place_at(signature, decision, Utc::now())
    }

    pub fn place_at(
        &mut self,
        signature: &FileSignature,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Placement {
        let timing = self.timing_of(signature, decision, now);
        let series_number = decision
            .series
            .as_deref()
            .map(|name| self.series.register(name, &signature.file_name()));
        Placement {
            folder: naming::destination_folder(&self.settings.destination_root, timing, &decision.category),
            file_name: naming::file_name(
                timing,
                &decision.category,
                &decision.description,
                series_number,
                &signature.extension,
            ),
            timing,
            series_number,
        }
    }
}

/// Strongest first, one entry per category, never the winning category.
fn rank_alternatives(mut candidates: Vec<Candidate>, winner: &str) -> Vec<Candidate> {
    candidates.retain(|c| !c.category.eq_ignore_ascii_case(winner));
    candidates.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.provenance.trust_rank().cmp(&a.provenance.trust_rank()))
    });
    let mut seen: Vec<String> = Vec::new();
    candidates.retain(|c| {
        let key = c.category.to_lowercase();
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggester::Naming;

    fn engine() -> DecisionEngine {
        let config = AppConfig::default();
        DecisionEngine::new(
            Stores::in_memory(&config),
            PatternRuleMatcher::builtin(),
            EngineSettings::from(&config),
        )
    }

    fn ai(category: &str, confidence: f64) -> Suggestion {
        Suggestion::new(
            category,
            Naming::UseNewDescription {
                description: "summary".into(),
            },
            confidence,
        )
    }

    #[test]
    fn fallback_when_nothing_is_known() {
        let mut engine = engine();
        let d = engine.decide(&FileSignature::new("zzz", ".bin"), None, None);
        assert_eq!(d.category, "Misc");
        assert_eq!(d.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(d.provenance, Provenance::Ai);
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn extension_hint_is_only_an_alternative() {
        let mut engine = engine();
        let d = engine.decide(&FileSignature::new("zzz", ".jpg"), None, None);
        assert_eq!(d.category, "Misc");
        assert_eq!(d.alternatives[0].category, "Photos");
    }

    #[test]
    fn pattern_beats_suggestion_and_agreement_boosts() {
        let mut engine = engine();
        let sig = FileSignature::new("receipt_march", ".pdf");
        let d = engine.decide(&sig, Some(&ai("Work", 0.99)), None);
        assert_eq!(d.category, "Finance");
        assert_eq!(d.provenance, Provenance::Pattern);
        assert_eq!(d.confidence, 0.9);
        assert_eq!(d.matched_rule.as_deref(), Some("receipt|invoice"));
        assert_eq!(d.alternatives[0].category, "Work");

        let sig = FileSignature::new("invoice_april", ".pdf");
        let d = engine.decide(&sig, Some(&ai("finance", 0.6)), None);
        assert!((d.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn suggestion_confidence_is_capped_for_derived_decisions() {
        let mut engine = engine();
        let d = engine.decide(&FileSignature::new("notes", ".txt"), Some(&ai("Work", 1.0)), None);
        assert_eq!(d.confidence, MAX_DERIVED_CONFIDENCE);
    }

    #[test]
    fn decisions_from_rules_and_suggestions_are_cached() {
        let mut engine = engine();
        let sig = FileSignature::new("hw4", ".pdf");
        let first = engine.decide(&sig, None, None);
        assert!(!first.cached);
        let second = engine.decide(&sig, None, None);
        assert!(second.cached);
        assert_eq!(second.source(), Provenance::Cache);
        assert_eq!(second.provenance, Provenance::Pattern);
        assert_eq!(second.category, first.category);
    }

    #[test]
    fn folder_decisions_are_not_cached() {
        let mut engine = engine();
        let sig = FileSignature::new("whatever", ".pdf").in_folder("Finance");
        let d = engine.decide(&sig, Some(&ai("Work", 0.9)), None);
        assert_eq!(d.category, "Finance");
        assert_eq!(d.confidence, 0.95);
        assert_eq!(d.provenance, Provenance::LearnedFolder);
        assert!(engine.cache().is_empty());
    }

    #[test]
    fn manual_hint_wins_over_everything() {
        let mut engine = engine();
        let sig = FileSignature::new("receipt", ".pdf").in_folder("Finance");
        let hint = FolderHint::Manual("Travel".into());
        let d = engine.decide(&sig, None, Some(&hint));
        assert_eq!(d.category, "Travel");
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.provenance, Provenance::ManualOverride);
    }

    #[test]
    fn blank_manual_categories_fall_back_to_default() {
        let mut engine = engine();
        let sig = FileSignature::new("scan", ".pdf").in_folder("Inbox");
        let hint = FolderHint::Manual("   ".into());
        assert_eq!(engine.decide(&sig, None, Some(&hint)).category, "Misc");

        let prior = engine.decide(&FileSignature::new("memo", ".txt"), Some(&ai("Work", 0.7)), None);
        let d = engine.apply_override(&FileSignature::new("memo", ".txt"), &prior, "");
        assert_eq!(d.category, "Misc");
        assert_eq!(d.provenance, Provenance::ManualOverride);

        let unnamed = engine.decide(&FileSignature::new("blob", ".bin"), Some(&ai("", 0.8)), None);
        assert_eq!(unnamed.category, "Misc");
    }

    #[test]
    fn override_records_correction_and_caches() {
        let mut engine = engine();
        let sig = FileSignature::new("report", ".pdf").in_folder("Inbox");
        let prior = engine.decide(&sig, Some(&ai("Work", 0.7)), None);
        let d = engine.apply_override(&sig, &prior, "Finance");
        assert_eq!(d.provenance, Provenance::ManualOverride);
        assert_eq!(d.description, prior.description);
        assert_eq!(engine.memory().folder_bias("Inbox"), Some(("Finance".to_string(), 1)));

        let again = engine.decide(&sig, None, None);
        assert!(again.cached);
        assert_eq!(again.category, "Finance");
    }

    #[test]
    fn try_resolve_local_skips_suggestions() {
        let mut engine = engine();
        assert!(engine
            .try_resolve_local(&FileSignature::new("holiday", ".txt"), None)
            .is_none());
        let d = engine
            .try_resolve_local(&FileSignature::new("IMG_1234", ".jpg"), None)
            .unwrap();
        assert_eq!(d.category, "Photos");
    }

    #[test]
    fn batch_shares_folder_inference() {
        let mut engine = engine();
        let sigs: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|s| FileSignature::new(*s, ".pdf").in_folder("Medical"))
            .collect();
        let decisions = engine.decide_batch(&sigs, &[]);
        assert_eq!(decisions.len(), 3);
        assert!(decisions.iter().all(|d| d.category == "Medical"));
    }

    #[test]
    fn timing_override_takes_effect_for_seeded_categories() {
        use crate::timing::Season;
        let mut engine = engine();
        let spring = Timing::new(2025, Season::Spring);
        assert_eq!(engine.override_timing("CS230P", spring), spring);
        assert_eq!(engine.timing_for("CS230P"), Some(spring));
        assert_eq!(engine.memory().timing_for("CS230P"), None);

        let summer = Timing::new(2023, Season::Summer);
        assert_eq!(engine.override_timing("Travel", summer), summer);
        assert_eq!(engine.memory().timing_for("Travel"), Some(summer));
        assert_eq!(engine.categories().timing_for("Travel"), None);
    }

    #[test]
    fn placement_uses_registry_timing() {
        let mut engine = engine();
        let sig = FileSignature::new("Week 3_Notes", ".pdf");
        let d = Decision::new("CS230P", NamingStrategy::UseOriginal, "Week 3_Notes", 0.9, Provenance::Ai);
        let p = engine.place(&sig, &d);
        assert_eq!(p.file_name, "2024-Fall__CS230P__week-3-notes.pdf");
        assert_eq!(p.folder, PathBuf::from("Organized/2024-Fall/CS230P"));
    }
}
