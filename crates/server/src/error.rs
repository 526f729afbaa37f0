//! Structured errors for the swgate host.

use swgate_client::UrlError;

/// Errors raised while decoding host events.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// The line is not a known lifecycle event.
    #[error("INVALID_EVENT: {0}")]
    InvalidEvent(String),

    /// The fetch event's URL cannot be resolved.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(#[from] UrlError),
}

impl From<serde_json::Error> for HostError {
    fn from(err: serde_json::Error) -> Self {
        HostError::InvalidEvent(err.to_string())
    }
}
