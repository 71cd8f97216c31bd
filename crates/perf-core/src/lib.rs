//! # perf-core
//!
//! Core types shared by every perfrec crate:
//! - `Operation` values for observed database queries and cache calls
//! - Cache key cleaning (volatile substrings redacted to `#`)
//! - Performance record entries and their line diff
//! - Alias ordering with `default` first
//! - Cross-cutting error types

pub mod cache_key;
pub mod errors;
pub mod names;
pub mod operation;
pub mod record;

pub use cache_key::clean_key;
pub use errors::CoreError;
pub use names::sorted_names;
pub use operation::{CacheKeys, CacheOp, DEFAULT_ALIAS, DbOp, Operation, Query, Traceback};
pub use record::{PerformanceRecord, RecordEntry, record_diff};
