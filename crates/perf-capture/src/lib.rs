//! # perf-capture
//!
//! Capture scopes for performance-regression tests.
//!
//! Register database and cache clients in a [`SourceRegistry`], wrap a test
//! body in [`CaptureContext::record`], and every query and cache call made
//! through the registered handles is fingerprinted into a record. At the end
//! of the scope the record is compared with the one stored next to the test
//! source, or written there if it does not exist yet.
//!
//! ```no_run
//! use perf_capture::{CaptureContext, RecordOptions, SourceRegistry, current_test};
//! use perf_capture::memory::MemoryCache;
//!
//! let mut registry = SourceRegistry::new();
//! let cache = registry.add_cache("default", MemoryCache::new());
//! let context = CaptureContext::new(registry).with_current_test(current_test!()?);
//!
//! context.record(RecordOptions::new(), || {
//!     cache.get("user:1")?;
//!     Ok(())
//! })?;
//! # Ok::<(), perf_capture::CaptureError>(())
//! ```

mod context;
mod error;
mod fanout;
mod identity;
pub mod memory;
mod naming;
mod recorder;
mod source;

pub use context::{CaptureContext, RecordOptions};
pub use error::CaptureError;
pub use fanout::AllSourceRecorder;
pub use identity::{CurrentTest, TestDetails};
pub use naming::{PERF_EXTENSION, RecordNamer, default_perf_path, resolve_path};
pub use recorder::{CaptureState, OperationFilter, PerformanceRecorder};
pub use source::{
    CacheBackend, CacheHandle, CacheVerb, DatabaseBackend, DatabaseHandle, Observer, RawOperation,
    Source, SourceKind, SourceRegistry,
};
