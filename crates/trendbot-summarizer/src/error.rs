use thiserror::Error;

/// Failures that make the summarization collaborator unavailable for one
/// analysis window.
#[derive(Debug, Error)]
pub enum SummarizerError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        endpoint: &'static str,
        status: u16,
        body: String,
    },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The model answered, but not with a usable summary.
    #[error("invalid summary response: {0}")]
    InvalidResponse(String),

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}
