//! Capture error types.

use thiserror::Error;

use crate::recorder::CaptureState;
use crate::source::SourceKind;

/// Errors from capturing operations and reconciling records.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The captured record differs from the stored one.
    #[error("Performance record did not match for {record_name}{}", render_diff(.diff.as_deref()))]
    RecordMismatch {
        record_name: String,
        /// Line diff of stored vs captured, unless diff rendering is off.
        diff: Option<String>,
    },

    /// The mode requires a stored record and there is none.
    #[error("Original performance record does not exist for {record_name}")]
    MissingRecord { record_name: String },

    /// A capture scope is already observing this resource.
    #[error("{kind} '{alias}' is already being captured")]
    AlreadyCapturing { kind: SourceKind, alias: String },

    /// No resource is registered under this alias.
    #[error("No {kind} registered under alias '{alias}'")]
    UnknownAlias { kind: SourceKind, alias: String },

    /// A recorder was driven out of order, e.g. finished before it started.
    #[error("Cannot {action} a recorder that is {state}")]
    InvalidState {
        action: &'static str,
        state: CaptureState,
    },

    /// The current test could not be identified.
    #[error("Could not determine the current test: {0}")]
    TestIdentity(String),

    /// The body of a capture scope failed; nothing was reconciled.
    #[error("Capture body failed: {0}")]
    Body(#[source] anyhow::Error),

    /// The underlying database or cache client failed.
    #[error("Backend call failed: {0}")]
    Backend(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] perf_store::StoreError),

    #[error(transparent)]
    Core(#[from] perf_core::CoreError),

    #[error(transparent)]
    Config(#[from] perf_config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_diff(diff: Option<&str>) -> String {
    diff.map(|d| format!("\n{d}")).unwrap_or_default()
}
