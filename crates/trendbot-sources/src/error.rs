use thiserror::Error;
use trendbot_core::Source;

/// Failures that make one source unavailable for the current run.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream API answered with a non-success status.
    #[error("{feed} returned HTTP {status} for {url}")]
    UnexpectedStatus {
        feed: Source,
        status: u16,
        url: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// Credentials required by the source are not configured.
    #[error("{0} is not configured: {1}")]
    NotConfigured(Source, &'static str),

    /// Every sub-request the adapter issued failed.
    #[error("{feed}: all requests failed; last error: {last_error}")]
    AllRequestsFailed { feed: Source, last_error: String },
}
