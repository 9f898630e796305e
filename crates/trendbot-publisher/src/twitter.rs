//! X/Twitter v2 post client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::error::PublishError;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Clone)]
pub struct TwitterPublisher {
    client: Client,
    base_url: String,
    access_token: String,
}

impl std::fmt::Debug for TwitterPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterPublisher")
            .field("base_url", &self.base_url)
            .field("access_token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl TwitterPublisher {
    /// # Errors
    ///
    /// Returns [`PublishError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(access_token: &str, timeout_secs: u64) -> Result<Self, PublishError> {
        Self::with_base_url(access_token, DEFAULT_BASE_URL, timeout_secs)
    }

    /// Creates a client against a custom base URL (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Unavailable`] if the HTTP client cannot be built.
    pub fn with_base_url(
        access_token: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            access_token: access_token.to_owned(),
        })
    }

    /// Post `content` and return the new post id.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Rejected`] for 4xx answers other than 429,
    /// and [`PublishError::Unavailable`] for throttling, server errors,
    /// transport failures, and unreadable success bodies.
    pub async fn publish(&self, content: &str) -> Result<String, PublishError> {
        self.post(content, None).await
    }

    /// Post `posts` as a thread, each one replying to the previous, and
    /// return every post id, head first.
    ///
    /// # Errors
    ///
    /// Returns the head's error if nothing was posted, or
    /// [`PublishError::ThreadInterrupted`] if a reply failed after the head
    /// went out.
    pub async fn publish_thread(&self, posts: &[String]) -> Result<Vec<String>, PublishError> {
        let mut posted: Vec<String> = Vec::with_capacity(posts.len());
        for content in posts {
            match self.post(content, posted.last().map(String::as_str)).await {
                Ok(id) => posted.push(id),
                Err(e) if posted.is_empty() => return Err(e),
                Err(e) => {
                    tracing::warn!(posted = posted.len(), total = posts.len(), error = %e, "thread reply failed");
                    return Err(PublishError::ThreadInterrupted {
                        posted,
                        cause: Box::new(e),
                    });
                }
            }
        }
        Ok(posted)
    }

    async fn post(&self, content: &str, reply_to: Option<&str>) -> Result<String, PublishError> {
        let url = format!("{}/2/tweets", self.base_url);
        let body = match reply_to {
            Some(id) => json!({ "text": content, "reply": { "in_reply_to_tweet_id": id } }),
            None => json!({ "text": content }),
        };
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let parsed: CreateTweetResponse = serde_json::from_str(&body).map_err(|e| {
                PublishError::Unavailable(format!("unreadable create-post response: {e}"))
            })?;
            return Ok(parsed.data.id);
        }

        let detail: String = body.chars().take(300).collect();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(PublishError::Unavailable(format!("HTTP {}: {detail}", status.as_u16())))
        } else {
            Err(PublishError::Rejected {
                status: status.as_u16(),
                detail,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = TwitterPublisher::with_base_url("t", "http://localhost:1234/", 5).unwrap();
        assert_eq!(client.base_url, "http://localhost:1234");
    }

    #[test]
    fn debug_redacts_token() {
        let client = TwitterPublisher::new("secret-token", 5).unwrap();
        assert!(!format!("{client:?}").contains("secret-token"));
    }
}
