use std::path::PathBuf;

use thiserror::Error;

/// Per-file errors raised while resolving a compression request. Tool-level
/// failures are not represented here: they are classified by the executor
/// into an [`crate::executor::EncodeResult`] instead, because a failed
/// encode is a recorded outcome rather than a propagated error.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The caller requested a preset label that is not in the catalog. Not
    /// retryable without fixing the request.
    #[error("unknown preset {0:?}")]
    UnknownPreset(String),

    /// Required properties of the source video (resolution, color metadata)
    /// could not be determined. Treated as a bad or corrupt input, not an
    /// encoder fault.
    #[error("unable to determine input properties for {path:?}: {reason}")]
    InputProperties { path: PathBuf, reason: String },
}
