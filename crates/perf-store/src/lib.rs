//! # perf-store
//!
//! Persistent storage of performance records: one YAML mapping of
//! record-name to record per test source file.
//!
//! Files are read once per process and cached by absolute path; writes take
//! an exclusive advisory lock and merge with whatever is on disk, so several
//! processes can record into the same file.

pub mod error;
pub mod kv_file;

pub use error::StoreError;
pub use kv_file::{KvFile, clear_load_cache};
