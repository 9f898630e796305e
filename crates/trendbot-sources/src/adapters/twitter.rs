//! Twitter/X recent search via the v2 API (app-only bearer token).

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map};
use trendbot_core::{RawItem, Source};

use super::{build_client, get_json, join, normalise_base_url, tidy_text, HttpSettings};
use crate::error::SourceError;

const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
const MIN_RESULTS: usize = 10;
const MAX_RESULTS: usize = 100;
/// Recent search only reaches back seven days.
const MAX_LOOKBACK_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
    author_id: Option<String>,
    public_metrics: Option<PublicMetrics>,
}

#[derive(Debug, Default, Deserialize)]
struct PublicMetrics {
    #[serde(default)]
    retweet_count: u64,
    #[serde(default)]
    reply_count: u64,
    #[serde(default)]
    like_count: u64,
    #[serde(default)]
    quote_count: u64,
}

#[derive(Clone)]
pub struct TwitterAdapter {
    client: Client,
    base_url: Url,
    bearer_token: String,
    query: String,
}

impl std::fmt::Debug for TwitterAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterAdapter")
            .field("base_url", &self.base_url.as_str())
            .field("bearer_token", &"[redacted]")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl TwitterAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(
        settings: &HttpSettings,
        bearer_token: String,
        query: String,
    ) -> Result<Self, SourceError> {
        Self::with_base_url(settings, bearer_token, query, DEFAULT_BASE_URL)
    }

    /// Point the adapter at a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the client cannot be built or the URL is invalid.
    pub fn with_base_url(
        settings: &HttpSettings,
        bearer_token: String,
        query: String,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: normalise_base_url(base_url)?,
            bearer_token,
            query,
        })
    }

    pub(crate) async fn fetch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        let earliest = Utc::now() - Duration::days(MAX_LOOKBACK_DAYS) + Duration::minutes(1);
        let start_time = since.max(earliest);

        let mut url = join(&self.base_url, "2/tweets/search/recent")?;
        url.query_pairs_mut()
            .append_pair("query", &self.query)
            .append_pair(
                "max_results",
                &limit.clamp(MIN_RESULTS, MAX_RESULTS).to_string(),
            )
            .append_pair(
                "start_time",
                &start_time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            )
            .append_pair("tweet.fields", "created_at,public_metrics,author_id");

        let response: SearchResponse =
            get_json(Source::Twitter, self.client.get(url).bearer_auth(&self.bearer_token)).await?;

        Ok(response
            .data
            .into_iter()
            .take(limit)
            .map(to_raw_item)
            .collect())
    }
}

fn to_raw_item(tweet: Tweet) -> RawItem {
    let metrics = tweet.public_metrics.unwrap_or_default();

    let mut metadata = Map::new();
    metadata.insert("likes".to_string(), json!(metrics.like_count));
    metadata.insert("retweets".to_string(), json!(metrics.retweet_count));
    metadata.insert("replies".to_string(), json!(metrics.reply_count));
    metadata.insert("quotes".to_string(), json!(metrics.quote_count));
    if let Some(author_id) = tweet.author_id {
        metadata.insert("author_id".to_string(), json!(author_id));
    }

    // Retweets spread a topic further than likes do.
    #[allow(clippy::cast_precision_loss)]
    let engagement_score = (metrics.like_count
        + 2 * metrics.retweet_count
        + metrics.reply_count
        + metrics.quote_count) as f64;

    RawItem {
        url: format!("https://x.com/i/web/status/{}", tweet.id),
        external_id: Some(tweet.id),
        text: tidy_text(&tweet.text, 1000),
        posted_at: tweet.created_at,
        engagement_score,
        metadata,
    }
}
