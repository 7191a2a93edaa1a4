//! Category registry: built-in academic and general labels, user-added labels, and a
//! per-category timing table.

use crate::timing::{Season, Timing};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::Document;
use tracing::{debug, info, warn};

const ACADEMIC: &[&str] = &[
    "PHIL-TR013", "SOC-TR011", "WGST-TR000", "CS111", "GER101", "GER102", "GER201", "GER202W",
    "GER232", "MATH116", "SOC223", "MUS100", "MUS275", "PHIL108Y", "PHIL221", "ARTH100",
    "PHYS104", "CS-TR000", "ENG-TR002", "ARTS109", "ARTS240", "CPLT275", "CS230P", "CS220",
    "HIST293", "SOC256", "MIT4031", "CAMS235", "WGST250", "WGST307",
];

const GENERAL: &[&str] = &[
    "Personal", "Finance", "Medical", "Identity", "Receipts", "Photos", "Screenshots",
    "Reference", "Work", "Travel", "Projects",
];

const TIMINGS: &[(&str, i32, Season)] = &[
    ("PHIL-TR013", 2021, Season::Fall),
    ("SOC-TR011", 2021, Season::Fall),
    ("WGST-TR000", 2021, Season::Fall),
    ("CS111", 2021, Season::Fall),
    ("GER101", 2021, Season::Fall),
    ("GER102", 2022, Season::Spring),
    ("GER201", 2022, Season::Fall),
    ("GER202W", 2023, Season::Spring),
    ("GER232", 2023, Season::Fall),
    ("MATH116", 2022, Season::Spring),
    ("SOC223", 2022, Season::Spring),
    ("MUS100", 2022, Season::Spring),
    ("MUS275", 2022, Season::Fall),
    ("PHIL108Y", 2022, Season::Fall),
    ("PHIL221", 2023, Season::Spring),
    ("ARTH100", 2022, Season::Fall),
    ("PHYS104", 2023, Season::Spring),
    ("CS-TR000", 2021, Season::Fall),
    ("ENG-TR002", 2021, Season::Fall),
    ("ARTS109", 2023, Season::Fall),
    ("ARTS240", 2024, Season::Spring),
    ("CPLT275", 2023, Season::Fall),
    ("CS230P", 2024, Season::Fall),
    ("CS220", 2024, Season::Spring),
    ("HIST293", 2024, Season::Spring),
    ("SOC256", 2024, Season::Spring),
    ("MIT4031", 2024, Season::Fall),
    ("CAMS235", 2024, Season::Fall),
    ("WGST250", 2024, Season::Fall),
    ("WGST307", 2024, Season::Fall),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RegistryDocument {
    academic: Vec<String>,
    general: Vec<String>,
    custom: Vec<String>,
    timings: BTreeMap<String, Timing>,
}

impl Default for RegistryDocument {
    fn default() -> Self {
        let owned = |labels: &[&str]| -> Vec<String> { labels.iter().map(|l| l.to_string()).collect() };
        Self {
            academic: owned(ACADEMIC),
            general: owned(GENERAL),
            custom: Vec::new(),
            timings: TIMINGS
                .iter()
                .map(|(label, year, season)| (label.to_string(), Timing::new(*year, *season)))
                .collect(),
        }
    }
}

/// A label with its learned timing, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryEntry {
    pub label: String,
    pub timing: Option<Timing>,
}

pub struct CategoryRegistry {
    doc: RegistryDocument,
    document: Document,
}

impl CategoryRegistry {
    pub fn open(mut document: Document) -> Self {
        let doc: RegistryDocument = document.load();
        debug!(
            academic = doc.academic.len(),
            general = doc.general.len(),
            custom = doc.custom.len(),
            "category registry loaded"
        );
        Self { doc, document }
    }

    /// Seeded registry that never touches the disk.
    pub fn in_memory() -> Self {
        Self::open(Document::in_memory())
    }

    /// Academic, then general, then custom labels. The order backs numbered menus.
    pub fn all_categories(&self) -> Vec<&str> {
        self.doc
            .academic
            .iter()
            .chain(&self.doc.general)
            .chain(&self.doc.custom)
            .map(String::as_str)
            .collect()
    }

    pub fn entries(&self) -> Vec<CategoryEntry> {
        self.all_categories()
            .into_iter()
            .map(|label| CategoryEntry {
                label: label.to_string(),
                timing: self.timing_for(label),
            })
            .collect()
    }

    /// Exact, case-sensitive membership.
    pub fn contains(&self, label: &str) -> bool {
        self.all_categories().contains(&label)
    }

    /// Adds a custom label. Returns false for empty or already-present labels.
    /// Presence is checked case-sensitively, so "finance" and "Finance" can coexist.
    pub fn add(&mut self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() || self.contains(label) {
            return false;
        }
        if let Some(existing) = self
            .all_categories()
            .into_iter()
            .find(|c| c.eq_ignore_ascii_case(label))
        {
            debug!(label, existing, "adding label that differs only by case");
        }
        self.doc.custom.push(label.to_string());
        info!(label, "added custom category");
        self.persist();
        true
    }

    pub fn timing_for(&self, label: &str) -> Option<Timing> {
        self.doc.timings.get(label).copied()
    }

    /// Only called on explicit user input; timings are never inferred here.
    pub fn record_timing(&mut self, label: &str, timing: Timing) {
        let label = label.trim();
        if label.is_empty() {
            return;
        }
        self.doc.timings.insert(label.to_string(), timing);
        info!(label, timing = %timing.label(), "recorded category timing");
        self.persist();
    }

    /// Tier listing handed to suggestion sources.
    pub fn categories_for_prompt(&self) -> String {
        let mut out = format!(
            "ACADEMIC: {}\nGENERAL: {}",
            self.doc.academic.join(", "),
            self.doc.general.join(", ")
        );
        if !self.doc.custom.is_empty() {
            out.push_str(&format!("\nUSER CUSTOM: {}", self.doc.custom.join(", ")));
        }
        out
    }

    pub fn persistence_warning(&self) -> Option<&str> {
        self.document.warning()
    }

    fn persist(&mut self) {
        if let Err(err) = self.document.save(&self.doc) {
            warn!(%err, "could not save categories, continuing in memory");
        }
    }
}
