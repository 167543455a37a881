use reqwest::StatusCode;
use thiserror::Error;

/// Failures surfaced by the queue client and the page cache.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No response was received.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl QueueError {
    pub fn http(status: StatusCode, body: String) -> Self {
        QueueError::Http { status, body }
    }

    /// Status code of an HTTP failure, if the server answered at all.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            QueueError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Malformed(err.to_string())
    }
}
