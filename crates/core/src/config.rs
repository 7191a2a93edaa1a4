use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stores: StoreConfig,
    pub scan: ScanPaths,
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub classification: ClassificationConfig,
    pub naming: NamingConfig,
}

/// Locations of the three durable documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub cache_path: String,
    pub memory_path: String,
    pub categories_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_path: "data/ai_cache.json".to_string(),
            memory_path: "data/memory.json".to_string(),
            categories_path: "data/categories.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPaths {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Folders with fewer files than this are decided file by file.
    pub min_folder_files: usize,
    pub extensions: Vec<String>,
    /// Scan dot-files and dot-directories too.
    pub include_hidden: bool,
}

impl Default for ScanPaths {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            min_folder_files: 3,
            extensions: [
                ".pdf", ".png", ".jpg", ".jpeg", ".gif", ".webp", ".txt", ".md", ".docx", ".csv",
                ".zip", ".mov", ".mp4", ".xlsx", ".pptx",
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_hours: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub max_corrections: usize,
    pub max_description_corrections: usize,
    pub max_sessions: usize,
    /// Corrections to the same category needed before a folder is auto-applied.
    pub corroboration_threshold: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_corrections: 200,
            max_description_corrections: 100,
            max_sessions: 20,
            corroboration_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub accept: f64,
    pub review: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            accept: 0.85,
            review: 0.60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub destination_root: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            destination_root: "Organized".to_string(),
        }
    }
}

pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let mut settings = config::Config::builder();
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    } else {
        settings = settings.add_source(config::File::with_name("config/default").required(false));
    }
    let cfg = settings.build()?;
    Ok(cfg.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_file_yields_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.cache.ttl_hours, 24);
        assert_eq!(cfg.memory.max_corrections, 200);
        assert_eq!(cfg.scan.min_folder_files, 3);
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("organizer.toml");
        std::fs::write(
            &path,
            "[cache]\nttl_hours = 6\n\n[classification.thresholds]\naccept = 0.9\n",
        )
        .unwrap();
        let cfg = load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(cfg.cache.ttl_hours, 6);
        assert_eq!(cfg.cache.max_entries, 1000);
        assert_eq!(cfg.classification.thresholds.accept, 0.9);
        assert_eq!(cfg.classification.thresholds.review, 0.60);
    }
}
