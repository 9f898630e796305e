//! Source adapters: one HTTP client per trend source behind a single
//! `fetch(since, limit)` capability.

mod github;
mod hackernews;
mod reddit;
mod twitter;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use trendbot_core::{RawItem, Source};

use crate::error::SourceError;

pub use github::GithubAdapter;
pub use hackernews::HackernewsAdapter;
pub use reddit::RedditAdapter;
pub use twitter::TwitterAdapter;

/// Closed set of source adapters, selected by variant.
#[derive(Debug, Clone)]
pub enum SourceAdapter {
    Twitter(TwitterAdapter),
    Github(GithubAdapter),
    Reddit(RedditAdapter),
    Hackernews(HackernewsAdapter),
}

impl SourceAdapter {
    #[must_use]
    pub fn source(&self) -> Source {
        match self {
            SourceAdapter::Twitter(_) => Source::Twitter,
            SourceAdapter::Github(_) => Source::Github,
            SourceAdapter::Reddit(_) => Source::Reddit,
            SourceAdapter::Hackernews(_) => Source::Hackernews,
        }
    }

    /// Fetch up to `limit` items observed at or after `since`.
    ///
    /// Safe to call repeatedly with overlapping windows; callers deduplicate.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the source cannot be reached or its
    /// payload cannot be parsed.
    pub async fn fetch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        match self {
            SourceAdapter::Twitter(a) => a.fetch(since, limit).await,
            SourceAdapter::Github(a) => a.fetch(since, limit).await,
            SourceAdapter::Reddit(a) => a.fetch(since, limit).await,
            SourceAdapter::Hackernews(a) => a.fetch(since, limit).await,
        }
    }
}

impl From<TwitterAdapter> for SourceAdapter {
    fn from(adapter: TwitterAdapter) -> Self {
        SourceAdapter::Twitter(adapter)
    }
}

impl From<GithubAdapter> for SourceAdapter {
    fn from(adapter: GithubAdapter) -> Self {
        SourceAdapter::Github(adapter)
    }
}

impl From<RedditAdapter> for SourceAdapter {
    fn from(adapter: RedditAdapter) -> Self {
        SourceAdapter::Reddit(adapter)
    }
}

impl From<HackernewsAdapter> for SourceAdapter {
    fn from(adapter: HackernewsAdapter) -> Self {
        SourceAdapter::Hackernews(adapter)
    }
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

/// Timeouts and identification shared by every adapter's HTTP client.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: "trendbot/0.1 (trend-collector)".to_string(),
            timeout_secs: 30,
        }
    }
}

pub(crate) fn build_client(settings: &HttpSettings) -> Result<Client, SourceError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(settings.user_agent.clone())
        .build()?;
    Ok(client)
}

/// Parse `base_url`, ensuring exactly one trailing slash so relative joins
/// append to the path instead of replacing its last segment.
pub(crate) fn normalise_base_url(base_url: &str) -> Result<Url, SourceError> {
    let normalised = format!("{}/", base_url.trim_end_matches('/'));
    Url::parse(&normalised).map_err(|e| SourceError::InvalidBaseUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url, SourceError> {
    base.join(path).map_err(|e| SourceError::InvalidBaseUrl {
        url: format!("{base}{path}"),
        reason: e.to_string(),
    })
}

/// Send `request`, require a 2xx status, and parse the body as `T`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    feed: Source,
    request: RequestBuilder,
) -> Result<T, SourceError> {
    let response = request.send().await?;
    let status = response.status();
    let url = response.url().to_string();
    if !status.is_success() {
        return Err(SourceError::UnexpectedStatus {
            feed,
            status: status.as_u16(),
            url,
        });
    }
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| SourceError::Deserialize { context: url, source: e })
}

/// Collapse whitespace and cap `text` at `max_chars` characters.
pub(crate) fn tidy_text(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        collapsed.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_single_trailing_slash() {
        assert_eq!(
            normalise_base_url("https://api.github.com//").unwrap().as_str(),
            "https://api.github.com/"
        );
        let nested = normalise_base_url("http://127.0.0.1:9000/mock").unwrap();
        assert_eq!(
            join(&nested, "v0/topstories.json").unwrap().as_str(),
            "http://127.0.0.1:9000/mock/v0/topstories.json"
        );
    }

    #[test]
    fn invalid_base_url_is_reported() {
        assert!(matches!(
            normalise_base_url("not a url"),
            Err(SourceError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn tidy_text_collapses_and_truncates() {
        assert_eq!(tidy_text("  a\n\n b  ", 10), "a b");
        assert_eq!(tidy_text("abcdef", 3), "abc");
    }
}
