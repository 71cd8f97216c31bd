//! Record file paths and record names.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::CaptureError;
use crate::identity::TestDetails;

/// Extension of record files.
pub const PERF_EXTENSION: &str = "perf.yml";

/// The record file for a test source file: `tests/foo.rs` → `tests/foo.perf.yml`.
#[must_use]
pub fn default_perf_path(test_file: &Path) -> PathBuf {
    test_file.with_extension(PERF_EXTENSION)
}

/// Work out where a scope's record lives.
///
/// Without `path`, the record sits next to the test source. A `path` ending
/// in `/` names a directory to hold the default file name; relative
/// directories are taken from the test source's directory and created when
/// missing. Any other `path` is the record file itself.
///
/// `test_file` is only called when the test source is needed.
///
/// # Errors
///
/// Fails if the test cannot be identified or the directory cannot be
/// created.
pub fn resolve_path(
    path: Option<&str>,
    test_file: impl FnOnce() -> Result<PathBuf, CaptureError>,
) -> Result<PathBuf, CaptureError> {
    let Some(path) = path else {
        return Ok(default_perf_path(&test_file()?));
    };
    if !path.ends_with('/') {
        return Ok(PathBuf::from(path));
    }

    let test_file = test_file()?;
    let directory = Path::new(path);
    let directory = if directory.is_absolute() {
        directory.to_path_buf()
    } else {
        test_file
            .parent()
            .map_or_else(|| directory.to_path_buf(), |parent| parent.join(directory))
    };
    fs::create_dir_all(&directory)?;

    let default = default_perf_path(&test_file);
    Ok(match default.file_name() {
        Some(name) => directory.join(name),
        None => directory.join(PERF_EXTENSION),
    })
}

#[derive(Debug)]
struct Counter {
    file: PathBuf,
    base: String,
    count: u32,
}

/// Hands out record names, numbering repeated scopes within one test.
///
/// The first scope of a test with a given file and base name gets the base
/// name, later ones `.2`, `.3` and so on. Switching to another file or base
/// name restarts the count.
#[derive(Debug, Default)]
pub struct RecordNamer {
    counters: Mutex<HashMap<TestDetails, Counter>>,
}

impl RecordNamer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&self, test: &TestDetails, file: &Path) -> String {
        let base = test.base_record_name();
        let mut counters = self.counters.lock();

        match counters.get_mut(test) {
            Some(counter) if counter.file == file && counter.base == base => {
                counter.count += 1;
                format!("{base}.{}", counter.count)
            }
            _ => {
                counters.insert(
                    test.clone(),
                    Counter {
                        file: file.to_path_buf(),
                        base: base.clone(),
                        count: 1,
                    },
                );
                base
            }
        }
    }

    /// Forget every test's count.
    pub fn reset(&self) {
        self.counters.lock().clear();
    }
}
