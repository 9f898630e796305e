use thiserror::Error;

/// Why the publish collaborator did not publish.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The platform refused this content. Retrying the same text will not help.
    #[error("publish rejected (HTTP {status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// Transport-level failure: network, timeout, throttling, or server error.
    #[error("publisher unavailable: {0}")]
    Unavailable(String),

    #[error("publisher is not configured: {0}")]
    NotConfigured(&'static str),

    /// A thread stopped part-way. `posted` holds the ids that went out, head
    /// first; they stay public.
    #[error(
        "thread interrupted after {} post(s) (head {}): {cause}",
        .posted.len(),
        .posted.first().map_or("none", String::as_str)
    )]
    ThreadInterrupted {
        posted: Vec<String>,
        cause: Box<PublishError>,
    },
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        PublishError::Unavailable(e.to_string())
    }
}

/// Content failed local validation before any external call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("content failed validation: {}", issues.join("; "))]
pub struct ValidationError {
    pub issues: Vec<String>,
}
