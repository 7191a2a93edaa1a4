//! Static filename and extension rules that resolve files without a model call.
//!
//! Rules are ordered data: the first matching rule wins, so the order of
//! [`BUILTIN_RULES`] is part of the contract.

use crate::models::FileSignature;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::warn;

/// (pattern, category, confidence), evaluated top to bottom.
pub const BUILTIN_RULES: &[(&str, &str, f64)] = &[
    (r"hw\d+|homework\d+|assignment\d+", "Academic", 0.8),
    (r"lecture\d+|lec\d+|notes\d+", "Academic", 0.8),
    (r"midterm|final|exam\d+", "Academic", 0.85),
    (r"receipt|invoice", "Finance", 0.9),
    (r"screenshot|screen.?shot", "Screenshots", 0.9),
    (r"IMG_\d{4}|DSC\d{4}", "Photos", 0.85),
    (r"scan\d+|scanned", "Scans", 0.8),
];

/// Extension priors: weak hints, never enough on their own.
pub const EXTENSION_HINTS: &[(&str, &[(&str, f64)])] = &[
    (".pdf", &[("Academic", 0.3), ("Finance", 0.2), ("Personal", 0.2)]),
    (".png", &[("Screenshots", 0.4), ("Photos", 0.3)]),
    (".jpg", &[("Photos", 0.6), ("Screenshots", 0.2)]),
    (".jpeg", &[("Photos", 0.6), ("Screenshots", 0.2)]),
    (".xlsx", &[("Finance", 0.4), ("Work", 0.3)]),
    (".docx", &[("Academic", 0.3), ("Work", 0.3), ("Personal", 0.2)]),
];

#[derive(Debug, Clone)]
pub struct PatternRule {
    pub pattern: String,
    pub category: String,
    pub confidence: f64,
    regex: Regex,
}

impl PatternRule {
    pub fn new(pattern: &str, category: &str, confidence: f64) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            category: category.to_string(),
            confidence,
            regex,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// Result of a rule firing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternMatch {
    pub category: String,
    pub confidence: f64,
    /// The original stem, unmodified.
    pub description: String,
    pub pattern: String,
}

#[derive(Debug, Clone)]
pub struct PatternRuleMatcher {
    rules: Vec<PatternRule>,
}

impl Default for PatternRuleMatcher {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternRuleMatcher {
    pub fn builtin() -> Self {
        let rules = BUILTIN_RULES
            .iter()
            .filter_map(|(pattern, category, confidence)| {
                match PatternRule::new(pattern, category, *confidence) {
                    Ok(rule) => Some(rule),
                    Err(err) => {
                        warn!(pattern, %err, "skipping invalid pattern rule");
                        None
                    }
                }
            })
            .collect();
        Self { rules }
    }

    /// A matcher with no filename rules; extension hints still apply.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn with_rules(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// First rule matching the lower-cased stem.
    pub fn match_signature(&self, signature: &FileSignature) -> Option<PatternMatch> {
        let stem = signature.stem.to_lowercase();
        self.rules.iter().find(|rule| rule.is_match(&stem)).map(|rule| PatternMatch {
            category: rule.category.clone(),
            confidence: rule.confidence,
            description: signature.stem.clone(),
            pattern: rule.pattern.clone(),
        })
    }

    /// Highest-confidence extension prior; the earlier entry wins a tie.
    pub fn extension_hint(&self, signature: &FileSignature) -> Option<(String, f64)> {
        let ext = signature.extension.to_lowercase();
        let (_, hints) = EXTENSION_HINTS.iter().find(|(e, _)| *e == ext)?;
        hints
            .iter()
            .fold(None::<(&str, f64)>, |best, &(category, confidence)| match best {
                Some((_, c)) if c >= confidence => best,
                _ => Some((category, confidence)),
            })
            .map(|(category, confidence)| (category.to_string(), confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stem(s: &str) -> FileSignature {
        FileSignature::new(s, ".pdf")
    }

    #[test]
    fn builtin_rules_all_compile() {
        assert_eq!(PatternRuleMatcher::builtin().rules().len(), BUILTIN_RULES.len());
    }

    #[test]
    fn first_matching_rule_wins() {
        let matcher = PatternRuleMatcher::builtin();
        // Matches both the homework rule and the exam rule; homework comes first.
        let m = matcher.match_signature(&stem("final_hw3")).unwrap();
        assert_eq!(m.category, "Academic");
        assert_eq!(m.confidence, 0.8);
        assert_eq!(m.pattern, BUILTIN_RULES[0].0);
    }

    #[test]
    fn match_keeps_original_stem() {
        let matcher = PatternRuleMatcher::builtin();
        let m = matcher.match_signature(&stem("Amazon_Receipt_March")).unwrap();
        assert_eq!(m.category, "Finance");
        assert_eq!(m.confidence, 0.9);
        assert_eq!(m.description, "Amazon_Receipt_March");
    }

    #[test]
    fn camera_names_match_despite_lowercasing() {
        let matcher = PatternRuleMatcher::builtin();
        let m = matcher.match_signature(&stem("IMG_4031")).unwrap();
        assert_eq!(m.category, "Photos");
        assert!(matcher.match_signature(&stem("vacation")).is_none());
    }

    #[test]
    fn empty_matcher_never_matches() {
        assert!(PatternRuleMatcher::empty().match_signature(&stem("hw3")).is_none());
    }

    #[test]
    fn extension_hint_picks_strongest_entry() {
        let matcher = PatternRuleMatcher::empty();
        assert_eq!(
            matcher.extension_hint(&FileSignature::new("x", "JPG")),
            Some(("Photos".to_string(), 0.6))
        );
        // Tie between Academic and Work: the first listed wins.
        assert_eq!(
            matcher.extension_hint(&FileSignature::new("x", ".docx")),
            Some(("Academic".to_string(), 0.3))
        );
        assert_eq!(matcher.extension_hint(&FileSignature::new("x", ".zip")), None);
    }
}
