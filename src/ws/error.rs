use thiserror::Error;

/// Failures inside the relay itself. None of these ever escape the
/// connection they happened on.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed envelope: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("transport write failed: {0}")]
    Write(String),
}
