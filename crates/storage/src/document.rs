use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A single JSON document backing one store.
///
/// Documents without a path never touch the disk. Once a write fails the document is
/// marked degraded and later saves become no-ops, so the owning store keeps working
/// from memory. A document that could not be read is moved aside to `<name>.corrupt`
/// before anything overwrites it.
#[derive(Debug, Clone, Default)]
pub struct Document {
    path: Option<PathBuf>,
    degraded: Option<String>,
    load_warning: Option<String>,
}

impl Document {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            degraded: None,
            load_warning: None,
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Reads the document, falling back to `T::default()` when it is missing or
    /// cannot be parsed. An unreadable file is kept as `<name>.corrupt` and reported
    /// through [`Document::warning`].
    pub fn load<T: DeserializeOwned + Default>(&mut self) -> T {
        let Some(path) = self.path.clone() else {
            return T::default();
        };
        match read_json(&path) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(?path, "no document on disk, starting empty");
                T::default()
            }
            Err(err) => {
                warn!(?path, %err, "unreadable document, starting empty");
                let backup = corrupt_path(&path);
                let kept = match fs::rename(&path, &backup) {
                    Ok(()) => format!("kept as {}", backup.display()),
                    Err(rename_err) => {
                        warn!(?path, %rename_err, "could not move unreadable document aside");
                        "left in place".to_string()
                    }
                };
                self.load_warning = Some(format!(
                    "{} could not be read ({err}), started empty; original {kept}",
                    path.display()
                ));
                T::default()
            }
        }
    }

    /// Rewrites the whole document. The first failure degrades the document to
    /// in-memory-only mode and is returned to the caller; subsequent saves are skipped.
    pub fn save<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if self.degraded.is_some() {
            return Ok(());
        }
        if let Err(err) = write_json(path, value) {
            self.degraded = Some(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    /// True while saves still reach the disk.
    pub fn is_persistent(&self) -> bool {
        self.path.is_some() && self.degraded.is_none()
    }

    /// Reason the document fell back to memory or started empty, if either happened.
    /// A failed write takes precedence over a failed read.
    pub fn warning(&self) -> Option<&str> {
        self.degraded.as_deref().or(self.load_warning.as_deref())
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".corrupt");
    PathBuf::from(name)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Counter {
        hits: u32,
        labels: Vec<String>,
    }

    #[test]
    fn missing_document_loads_default() {
        let temp = tempfile::tempdir().unwrap();
        let mut doc = Document::at(temp.path().join("absent.json"));
        assert_eq!(doc.load::<Counter>(), Counter::default());
        assert!(doc.is_persistent());
        assert!(doc.warning().is_none());
    }

    #[test]
    fn corrupt_document_loads_default() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("memory.json");
        fs::write(&path, "{ not json").unwrap();
        let mut doc = Document::at(&path);
        assert_eq!(doc.load::<Counter>(), Counter::default());

        let warning = doc.warning().unwrap();
        assert!(warning.contains("could not be read"));
        assert!(doc.is_persistent());
        assert!(!path.exists());
        let backup = temp.path().join("memory.json.corrupt");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "{ not json");

        // Saving afterwards leaves the moved-aside original alone.
        doc.save(&Counter::default()).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "{ not json");
    }

    #[test]
    fn saved_document_is_read_back() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("cache.json");
        let mut doc = Document::at(&path);
        let value = Counter {
            hits: 3,
            labels: vec!["Finance".into()],
        };
        doc.save(&value).unwrap();
        assert!(path.exists());
        assert_eq!(Document::at(&path).load::<Counter>(), value);
    }

    #[test]
    fn failed_write_degrades_to_memory() {
        let temp = tempfile::tempdir().unwrap();
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();
        let mut doc = Document::at(blocker.join("categories.json"));

        assert!(doc.save(&Counter::default()).is_err());
        assert!(!doc.is_persistent());
        assert!(doc.warning().is_some());
        // Later saves are skipped instead of failing again.
        assert!(doc.save(&Counter::default()).is_ok());
    }

    #[test]
    fn in_memory_document_never_writes() {
        let mut doc = Document::in_memory();
        assert!(doc.save(&Counter::default()).is_ok());
        assert!(doc.path().is_none());
        assert!(!doc.is_persistent());
    }
}
