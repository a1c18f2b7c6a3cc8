//! Error types shared across the annotation pipeline

use thiserror::Error;

/// Geometry errors raised by coordinate mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Rotation outside {0, 90, 180, 270}
    #[error("unsupported rotation: {0} degrees")]
    InvalidRotation(i32),
}

/// Failures of the remote furigana endpoint
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No response within the configured timeout
    #[error("furigana lookup timed out")]
    Timeout,

    /// Transport-level failure
    #[error("furigana request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("furigana endpoint returned status {0}")]
    Status(u16),

    /// Response body could not be decoded
    #[error("malformed furigana response: {0}")]
    Decode(String),
}

/// Failure to resolve a reading
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Every tier answered, none knew the word
    #[error("no reading found for {0:?}")]
    NotFound(String),

    /// Remote tier failed and nothing else was available
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Failure of a single pipeline pass
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The OCR engine call failed
    #[error("OCR engine failure: {0:#}")]
    Engine(anyhow::Error),

    /// The pass task panicked or was cancelled before producing a result
    #[error("pass aborted: {0}")]
    Aborted(String),
}
