//! Session-scoped series numbering and filename-based series detection.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Tried in order; the first pattern that matches a stem decides its series.
const SERIES_PATTERNS: &[&str] = &[r"(?i)(\D+?)(\d+)", r"(?i)(\D+)_(\d+)", r"(?i)(\D+)-(\d+)"];

fn series_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        SERIES_PATTERNS
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesInfo {
    pub count: usize,
    /// Up to the three most recently registered files.
    pub recent: Vec<String>,
}

#[derive(Debug, Default)]
struct SeriesState {
    next: u32,
    files: Vec<String>,
}

/// Hands out 1, 2, 3, ... per series name. Numbers live only as long as the tracker.
#[derive(Debug, Default)]
pub struct SeriesTracker {
    series: BTreeMap<String, SeriesState>,
}

impl SeriesTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, file_name: &str) -> u32 {
        let state = self
            .series
            .entry(name.to_string())
            .or_insert_with(|| SeriesState {
                next: 1,
                files: Vec::new(),
            });
        let number = state.next;
        state.next += 1;
        state.files.push(file_name.to_string());
        number
    }

    pub fn series_info(&self) -> BTreeMap<String, SeriesInfo> {
        self.series
            .iter()
            .map(|(name, state)| {
                let skip = state.files.len().saturating_sub(3);
                (
                    name.clone(),
                    SeriesInfo {
                        count: state.files.len(),
                        recent: state.files[skip..].to_vec(),
                    },
                )
            })
            .collect()
    }
}

/// Groups stems that look like `hw1`, `scan_001` or `page-01` by their name part.
/// Groups with a single file are dropped.
pub fn detect_from_filenames<'a>(
    stems: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<String, Vec<(String, u64)>> {
    let mut groups: BTreeMap<String, Vec<(String, u64)>> = BTreeMap::new();
    for stem in stems {
        for pattern in series_patterns() {
            let Some(caps) = pattern.captures(stem) else {
                continue;
            };
            let name = caps[1].trim_matches(|c| c == '_' || c == '-' || c == ' ');
            if let (false, Ok(number)) = (name.is_empty(), caps[2].parse::<u64>()) {
                groups
                    .entry(name.to_string())
                    .or_default()
                    .push((stem.to_string(), number));
            }
            break;
        }
    }
    groups.retain(|_, files| files.len() >= 2);
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_starts_at_one_per_series() {
        let mut tracker = SeriesTracker::new();
        assert_eq!(tracker.register("hw", "hw_a.pdf"), 1);
        assert_eq!(tracker.register("hw", "hw_b.pdf"), 2);
        assert_eq!(tracker.register("scan", "s.pdf"), 1);
        assert_eq!(tracker.register("hw", "hw_c.pdf"), 3);

        let info = tracker.series_info();
        assert_eq!(info["hw"].count, 3);
        assert_eq!(info["scan"].recent, vec!["s.pdf".to_string()]);

        assert_eq!(SeriesTracker::new().register("hw", "hw_d.pdf"), 1);
    }

    #[test]
    fn recent_keeps_last_three() {
        let mut tracker = SeriesTracker::new();
        for i in 0..5 {
            tracker.register("page", &format!("p{i}"));
        }
        assert_eq!(tracker.series_info()["page"].recent, vec!["p2", "p3", "p4"]);
    }

    #[test]
    fn detects_groups_of_two_or_more() {
        let groups = detect_from_filenames(["hw1", "hw2", "lecture3", "scan_001", "scan_002", "notes"]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["hw"], vec![("hw1".to_string(), 1), ("hw2".to_string(), 2)]);
        assert_eq!(groups["scan"].len(), 2);
        assert!(!groups.contains_key("lecture"));
    }
}
