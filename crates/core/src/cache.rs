//! Fingerprint-keyed cache of prior decisions with time-based expiry.

use crate::config::CacheConfig;
use crate::models::{Decision, FileSignature};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::Document;
use tracing::{debug, info, warn};

/// Only this much of the content preview takes part in the fingerprint.
pub const PREVIEW_KEY_CHARS: usize = 100;

/// Deterministic key over stem, extension, size, folder and the preview prefix. Fields
/// are length-prefixed so no two distinct projections share an input.
pub fn fingerprint(signature: &FileSignature) -> String {
    let preview: String = signature.preview.chars().take(PREVIEW_KEY_CHARS).collect();
    let size = signature.size.to_string();
    let mut hasher = blake3::Hasher::new();
    for part in [
        signature.stem.as_str(),
        signature.extension.as_str(),
        size.as_str(),
        signature.folder.as_str(),
        preview.as_str(),
    ] {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Hour counts too large for a `Duration` mean entries never expire.
fn ttl_from_hours(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub decision: Decision,
    pub created_at: DateTime<Utc>,
    /// Kept for humans reading the cache file.
    #[serde(default)]
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Percentage in [0, 100].
    pub hit_rate: f64,
    pub size: usize,
}

pub struct ResultCache {
    entries: BTreeMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    document: Document,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    pub fn open(mut document: Document, config: &CacheConfig) -> Self {
        let entries: BTreeMap<String, CacheEntry> = document.load();
        debug!(entries = entries.len(), "result cache loaded");
        Self {
            entries,
            ttl: ttl_from_hours(config.ttl_hours),
            max_entries: config.max_entries,
            document,
            hits: 0,
            misses: 0,
        }
    }

    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::open(Document::in_memory(), config)
    }

    pub fn lookup(&mut self, signature: &FileSignature) -> Option<Decision> {
        self.lookup_at(signature, Utc::now())
    }

    pub fn lookup_at(&mut self, signature: &FileSignature, now: DateTime<Utc>) -> Option<Decision> {
        let key = fingerprint(signature);
        match self.entries.get(&key) {
            Some(entry) if self.is_valid(entry, now) => {
                self.hits += 1;
                Some(entry.decision.clone())
            }
            _ => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn store(&mut self, signature: &FileSignature, decision: &Decision) {
        self.store_at(signature, decision, Utc::now());
    }

    pub fn store_at(&mut self, signature: &FileSignature, decision: &Decision, now: DateTime<Utc>) {
        let mut decision = decision.clone();
        decision.cached = false;
        self.entries.insert(
            fingerprint(signature),
            CacheEntry {
                decision,
                created_at: now,
                file_name: signature.file_name(),
            },
        );
        if self.entries.len() > self.max_entries {
            self.purge_expired(now);
        }
        self.persist();
    }

    /// Drops every expired entry. Live entries are never evicted, even above the cap.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now - entry.created_at < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            info!(removed, "cache cleanup: removed expired entries");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
        info!("cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            self.hits as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            size: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn persistence_warning(&self) -> Option<&str> {
        self.document.warning()
    }

    fn is_valid(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at < self.ttl
    }

    fn persist(&mut self) {
        if let Err(err) = self.document.save(&self.entries) {
            warn!(%err, "could not save cache, continuing in memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NamingStrategy, Provenance};
    use chrono::TimeZone;

    fn sig(stem: &str) -> FileSignature {
        FileSignature::new(stem, ".pdf")
            .with_size(2048)
            .in_folder("Downloads")
            .with_preview("Invoice #42")
    }

    fn decision() -> Decision {
        Decision::new("Finance", NamingStrategy::RefineOriginal, "invoice", 0.9, Provenance::Pattern)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn fingerprint_uses_exactly_five_fields() {
        let base = sig("invoice");
        assert_eq!(fingerprint(&base), fingerprint(&base.clone()));
        assert_ne!(fingerprint(&base), fingerprint(&sig("invoice-copy")));
        assert_ne!(fingerprint(&base), fingerprint(&base.clone().with_size(2049)));
        assert_ne!(fingerprint(&base), fingerprint(&base.clone().in_folder("Desktop")));

        let long = "x".repeat(100);
        let a = base.clone().with_preview(format!("{long}tail-one"));
        let b = base.clone().with_preview(format!("{long}tail-two"));
        assert_eq!(fingerprint(&a), fingerprint(&b));

        let created = base.clone().created_at(t0());
        assert_eq!(fingerprint(&base), fingerprint(&created));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let mut cache = ResultCache::in_memory(&CacheConfig::default());
        cache.store_at(&sig("invoice"), &decision(), t0());

        let almost = t0() + Duration::hours(23) + Duration::minutes(59);
        assert_eq!(cache.lookup_at(&sig("invoice"), almost), Some(decision()));

        let past = t0() + Duration::hours(24) + Duration::minutes(1);
        assert_eq!(cache.lookup_at(&sig("invoice"), past), None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[test]
    fn oversized_ttl_never_expires() {
        let config = CacheConfig {
            ttl_hours: u64::MAX / 2,
            max_entries: 10,
        };
        let mut cache = ResultCache::in_memory(&config);
        cache.store_at(&sig("invoice"), &decision(), t0());
        let decade = t0() + Duration::days(3650);
        assert_eq!(cache.lookup_at(&sig("invoice"), decade), Some(decision()));
        assert_eq!(ttl_from_hours(u64::MAX), Duration::MAX);
        assert_eq!(ttl_from_hours(24), Duration::hours(24));
    }

    #[test]
    fn cap_only_evicts_expired_entries() {
        let config = CacheConfig {
            ttl_hours: 24,
            max_entries: 2,
        };
        let mut cache = ResultCache::in_memory(&config);
        cache.store_at(&sig("old"), &decision(), t0());
        let later = t0() + Duration::hours(30);
        cache.store_at(&sig("fresh-1"), &decision(), later);
        assert_eq!(cache.len(), 2);

        // Third insert crosses the cap: only the expired entry goes.
        cache.store_at(&sig("fresh-2"), &decision(), later);
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup_at(&sig("old"), later).is_none());

        // All live: cap is advisory.
        cache.store_at(&sig("fresh-3"), &decision(), later);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn survives_reopen_and_clear() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("ai_cache.json");
        let config = CacheConfig::default();
        {
            let mut cache = ResultCache::open(Document::at(&path), &config);
            cache.store(&sig("invoice"), &decision());
        }
        let mut reopened = ResultCache::open(Document::at(&path), &config);
        assert_eq!(reopened.len(), 1);
        assert!(reopened.lookup(&sig("invoice")).is_some());

        reopened.clear();
        assert!(ResultCache::open(Document::at(&path), &config).is_empty());
    }

    #[test]
    fn unwritable_store_keeps_working_in_memory() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let mut cache =
            ResultCache::open(Document::at(blocker.join("ai_cache.json")), &CacheConfig::default());
        cache.store(&sig("invoice"), &decision());
        assert!(cache.persistence_warning().is_some());
        assert!(cache.lookup(&sig("invoice")).is_some());
    }
}
