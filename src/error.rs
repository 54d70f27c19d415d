//! # Error Module
//!
//! The single error type shared by the crawl engine and the blocking bridge.
//!
//! Errors raised on the reactor thread travel to the waiting caller inside an
//! [`EventualResult`](crate::eventual::EventualResult). Because a finished
//! result can be waited on more than once, `SpiderError` is `Clone`; foreign
//! error types that are not are kept behind an `Arc` so the original value
//! can still be inspected with `downcast_ref`.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Errors produced while building, running or waiting on a crawl.
#[derive(Debug, Clone, Error)]
pub enum SpiderError {
    /// `wait()` gave up; the underlying operation was cancelled.
    #[error("timed out after {0:?} waiting for the crawl to finish")]
    Timeout(Duration),

    /// The result was cancelled before the operation published an outcome.
    #[error("the operation was cancelled before it completed")]
    Cancelled,

    /// Work was submitted before the reactor was started.
    #[error("the reactor is not running; call setup() first")]
    ReactorNotRunning,

    /// `wait()` was called from the reactor thread, which would block it forever.
    #[error("cannot block on a result from the reactor thread")]
    WaitOnReactorThread,

    /// Invalid invocation: malformed targets, bad settings, unusable spiders.
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("invalid url: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// Transport failure reported by the HTTP client.
    #[error("http error: {0}")]
    Http(Arc<reqwest::Error>),

    /// `fetch` finished without the target ever reaching its callback.
    #[error("no response was received for {0}")]
    NoResponse(Url),

    /// The submitted work panicked on the reactor thread.
    #[error("operation panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    GeneralError(String),

    /// Any other error raised by user code, kept intact for downcasting.
    #[error(transparent)]
    Other(Arc<anyhow::Error>),
}

impl SpiderError {
    /// Wraps an arbitrary error raised by a spider or pipeline.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        SpiderError::Other(Arc::new(error.into()))
    }

    /// Returns `true` if this error was produced by a timed out wait.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SpiderError::Timeout(_))
    }
}

impl From<reqwest::Error> for SpiderError {
    fn from(error: reqwest::Error) -> Self {
        SpiderError::Http(Arc::new(error))
    }
}

impl From<serde_json::Error> for SpiderError {
    fn from(error: serde_json::Error) -> Self {
        SpiderError::other(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("quota exhausted for {0}")]
    struct QuotaExceeded(&'static str);

    #[test]
    fn other_keeps_original_error_for_downcasting() {
        let err = SpiderError::other(QuotaExceeded("example.com"));
        let cloned = err.clone();

        match cloned {
            SpiderError::Other(inner) => {
                let original = inner.downcast_ref::<QuotaExceeded>().unwrap();
                assert_eq!(original.0, "example.com");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(err.to_string(), "quota exhausted for example.com");
    }

    #[test]
    fn url_errors_convert() {
        let err: SpiderError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, SpiderError::UrlParseError(_)));
    }

    #[test]
    fn timeout_is_recognised() {
        assert!(SpiderError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!SpiderError::Cancelled.is_timeout());
    }
}
