use thiserror::Error;

/// Retryable failure of a batch submission. Every variant leaves the pending set untouched.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response body: {0}")]
    Malformed(String),

    #[error("endpoint rejected batch with status {0:?}")]
    Rejected(String),
}
