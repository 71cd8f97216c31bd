//! Locked, cached YAML key-value file.

use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};
use perf_core::PerformanceRecord;
use serde_yaml::Value;
use tracing::debug;

use crate::error::StoreError;

/// Record name to record, sorted so rewrites are deterministic.
type Records = BTreeMap<String, PerformanceRecord>;

/// Loaded file contents, shared by every `KvFile` for the same path.
type SharedRecords = Arc<RwLock<Records>>;

static LOAD_CACHE: LazyLock<Mutex<HashMap<PathBuf, SharedRecords>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Forget every cached file load. The next [`KvFile::open`] reads from disk.
pub fn clear_load_cache() {
    LOAD_CACHE.lock().clear();
}

/// A YAML file mapping record names to performance records.
#[derive(Debug, Clone)]
pub struct KvFile {
    path: PathBuf,
    data: SharedRecords,
}

impl KvFile {
    /// Open the record file at `path`, reusing this process's earlier load of
    /// the same file if there is one.
    ///
    /// A missing or empty file opens as an empty store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be read or does not hold a
    /// YAML mapping of records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = std::path::absolute(path.as_ref())?;

        let mut cache = LOAD_CACHE.lock();
        let data = if let Some(data) = cache.get(&path).cloned() {
            data
        } else {
            let data = Arc::new(RwLock::new(load_file(&path)?));
            cache.insert(path.clone(), Arc::clone(&data));
            data
        };

        Ok(Self { path, data })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<PerformanceRecord> {
        self.data.read().get(key).cloned()
    }

    /// Store `value` under `key` and write it to disk.
    ///
    /// Does nothing if `key` already holds `value`. Otherwise the file is
    /// locked, re-read, and rewritten with the new value merged in, so keys
    /// written by other processes since our load are preserved. The loaded
    /// contents only change once the write has succeeded.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file cannot be locked, parsed or written.
    pub fn set_and_save(&self, key: &str, value: PerformanceRecord) -> Result<(), StoreError> {
        if self.data.read().get(key) == Some(&value) {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock()?;

        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let mut on_disk = parse(&self.path, &content)?;

        on_disk.insert(key.to_string(), value.clone());

        let yaml = serde_yaml::to_string(&on_disk)?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(yaml.as_bytes())?;
        file.flush()?;
        self.data.write().insert(key.to_string(), value);

        debug!(path = %self.path.display(), key, records = on_disk.len(), "saved record file");
        Ok(())
    }
}

fn load_file(path: &Path) -> Result<Records, StoreError> {
    let content = match File::open(path) {
        Ok(mut file) => {
            file.lock()?;
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            content
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "record file missing, starting empty");
            return Ok(Records::new());
        }
        Err(err) => return Err(err.into()),
    };

    let records = parse(path, &content)?;
    debug!(path = %path.display(), records = records.len(), "loaded record file");
    Ok(records)
}

fn parse(path: &Path, content: &str) -> Result<Records, StoreError> {
    if content.trim().is_empty() {
        return Ok(Records::new());
    }
    match serde_yaml::from_str::<Value>(content)? {
        Value::Null => Ok(Records::new()),
        value @ Value::Mapping(_) => Ok(serde_yaml::from_value(value)?),
        _ => Err(StoreError::NotAMapping {
            path: path.to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_null_document_is_empty() {
        let records = parse(Path::new("x.yml"), "~\n").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn parse_rejects_scalar() {
        let err = parse(Path::new("x.yml"), "just text").unwrap_err();
        assert!(matches!(err, StoreError::NotAMapping { .. }));
    }
}
