//! Cross-cutting error types for perfrec.
//!
//! Domain-specific errors (`StoreError`, `CaptureError`, ...) live in their
//! own crates. This one covers misuse of the core value types.

use thiserror::Error;

/// Errors that can be raised by the core value types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation at construction time.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
