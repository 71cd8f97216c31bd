//! Record store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or saving a record file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, locking or writing the file failed.
    #[error("Record file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid YAML or holds malformed records.
    #[error("Record file YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The top-level YAML value is not a mapping.
    #[error("YAML content of {} is not a mapping", path.display())]
    NotAMapping { path: PathBuf },
}
