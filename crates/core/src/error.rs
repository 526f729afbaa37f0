//! Unified error types for swgate.
//!
//! Only three kinds matter to the fetch policy: network failures (always
//! recovered through a cache lookup), cache misses (surfaced to the
//! requesting context) and cache write failures (swallowed). The remaining
//! variants cover the store backends and malformed input.

use tokio_rusqlite::rusqlite;

/// Unified error types for the interceptor and its cache stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The network fetch was rejected (offline, DNS, timeout, transport error).
    #[error("NETWORK_FAILURE: {0}")]
    NetworkFailure(String),

    /// No cache generation holds a response for the request.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// A put or delete against the cache store failed.
    #[error("CACHE_WRITE_FAILED: {0}")]
    CacheWrite(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored entry could not be decoded.
    #[error("CACHE_ERROR: corrupt entry: {0}")]
    CorruptEntry(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Request cannot be handled (e.g., unparsable event).
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// Lifecycle event arrived in a state that cannot accept it.
    #[error("INVALID_STATE: {0}")]
    InvalidState(String),
}

impl Error {
    /// Whether the error is an absent cache entry rather than a store fault.
    pub fn is_cache_miss(&self) -> bool {
        matches!(self, Error::CacheMiss(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("https://example.com/logo.png".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("logo.png"));
    }

    #[test]
    fn test_is_cache_miss() {
        assert!(Error::CacheMiss("x".into()).is_cache_miss());
        assert!(!Error::NetworkFailure("offline".into()).is_cache_miss());
        assert!(!Error::CacheWrite("quota".into()).is_cache_miss());
    }

    #[test]
    fn test_from_url_parse_error() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
