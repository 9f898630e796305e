//! Publishing collaborator: post composition, local content validation,
//! and the external post client.

pub mod compose;
pub mod error;
pub mod twitter;

use trendbot_core::PublisherSettings;

pub use compose::{
    compose_post, compose_thread, validate_post, BOT_TAG, MAX_HASHTAGS, MAX_POST_CHARS,
    MAX_THREAD_POSTS,
};
pub use error::{PublishError, ValidationError};
pub use twitter::TwitterPublisher;

/// Closed set of publish targets.
#[derive(Debug, Clone)]
pub enum Publisher {
    Twitter(TwitterPublisher),
    /// No credentials configured; every publish attempt fails without a
    /// network call.
    Unconfigured,
}

impl Publisher {
    /// # Errors
    ///
    /// Returns [`PublishError`] if the HTTP client cannot be built.
    pub fn from_settings(settings: &PublisherSettings) -> Result<Self, PublishError> {
        match settings.access_token.as_deref() {
            Some(token) => Ok(Publisher::Twitter(TwitterPublisher::with_base_url(
                token,
                &settings.base_url,
                settings.timeout_secs,
            )?)),
            None => {
                tracing::info!("TWITTER_USER_ACCESS_TOKEN not set; publishing is disabled");
                Ok(Publisher::Unconfigured)
            }
        }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        !matches!(self, Publisher::Unconfigured)
    }

    /// Publish `content`, returning the platform's reference for the post.
    ///
    /// # Errors
    ///
    /// See [`PublishError`].
    pub async fn publish(&self, content: &str) -> Result<String, PublishError> {
        match self {
            Publisher::Twitter(client) => client.publish(content).await,
            Publisher::Unconfigured => Err(PublishError::NotConfigured(
                "no publisher access token configured",
            )),
        }
    }

    /// Publish `posts` as a thread, returning every post id, head first.
    ///
    /// # Errors
    ///
    /// See [`TwitterPublisher::publish_thread`].
    pub async fn publish_thread(&self, posts: &[String]) -> Result<Vec<String>, PublishError> {
        match self {
            Publisher::Twitter(client) => client.publish_thread(posts).await,
            Publisher::Unconfigured => Err(PublishError::NotConfigured(
                "no publisher access token configured",
            )),
        }
    }
}
