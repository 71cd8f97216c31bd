//! Shared fixtures for capture integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use anyhow::bail;
use parking_lot::Mutex;
use perf_capture::memory::MemoryCache;
use perf_capture::{
    CacheHandle, CaptureContext, DatabaseBackend, DatabaseHandle, SourceRegistry, TestDetails,
};
use perf_config::{Mode, RecordingConfig};
use tempfile::TempDir;

/// Route `tracing` output to the test writer, filtered by `PERFREC_LOG`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_env("PERFREC_LOG")
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Database stand-in that remembers what it ran and rejects statements
/// containing `BROKEN`.
#[derive(Clone, Default)]
pub struct FakeDatabase {
    pub executed: Arc<Mutex<Vec<String>>>,
}

impl DatabaseBackend for FakeDatabase {
    fn execute(&self, sql: &str) -> anyhow::Result<u64> {
        if sql.contains("BROKEN") {
            bail!("syntax error near BROKEN");
        }
        self.executed.lock().push(sql.to_string());
        Ok(1)
    }
}

/// A temp directory holding a pretend test source file, plus the resources
/// of a small application.
pub struct Fixture {
    pub dir: TempDir,
    pub registry: SourceRegistry,
    pub db: Arc<DatabaseHandle>,
    pub cache: Arc<CacheHandle>,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let mut registry = SourceRegistry::new();
        let db = registry.add_database("default", FakeDatabase::default());
        let cache = registry.add_cache("default", MemoryCache::new());
        Self {
            dir,
            registry,
            db,
            cache,
        }
    }

    pub fn test_file(&self) -> PathBuf {
        self.dir.path().join("test_api.rs")
    }

    pub fn perf_file(&self) -> PathBuf {
        self.dir.path().join("test_api.perf.yml")
    }

    pub fn test(&self, class_name: Option<&str>, test_name: &str) -> TestDetails {
        TestDetails::new(self.test_file(), class_name, test_name)
    }

    /// A fresh context, as a new test process would build it.
    pub fn context(&self, mode: Mode) -> CaptureContext {
        self.context_with(RecordingConfig {
            mode,
            ..RecordingConfig::default()
        })
    }

    pub fn context_with(&self, recording: RecordingConfig) -> CaptureContext {
        CaptureContext::new(self.registry.clone())
            .with_recording(recording)
            .with_current_test(self.test(Some("ApiTests"), "test_listing"))
    }
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}
