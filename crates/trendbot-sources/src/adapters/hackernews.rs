//! Hacker News top stories via the public Firebase API.

use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map};
use trendbot_core::{RawItem, Source};

use super::{build_client, get_json, join, normalise_base_url, tidy_text, HttpSettings};
use crate::error::SourceError;

const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com";
const ITEM_CONCURRENCY: usize = 8;

#[derive(Debug, Deserialize)]
struct HnItem {
    id: u64,
    #[serde(rename = "type")]
    kind: Option<String>,
    title: Option<String>,
    url: Option<String>,
    score: Option<i64>,
    descendants: Option<i64>,
    by: Option<String>,
    time: Option<i64>,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    deleted: bool,
}

#[derive(Debug, Clone)]
pub struct HackernewsAdapter {
    client: Client,
    base_url: Url,
}

impl HackernewsAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings) -> Result<Self, SourceError> {
        Self::with_base_url(settings, DEFAULT_BASE_URL)
    }

    /// Point the adapter at a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the client cannot be built or the URL is invalid.
    pub fn with_base_url(settings: &HttpSettings, base_url: &str) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: normalise_base_url(base_url)?,
        })
    }

    /// Fetch the top stories, newest ranking first.
    ///
    /// Individual story lookups that fail are skipped with a warning; only a
    /// failed top-stories listing fails the fetch.
    pub(crate) async fn fetch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        let list_url = join(&self.base_url, "v0/topstories.json")?;
        let ids: Vec<u64> = get_json(Source::Hackernews, self.client.get(list_url)).await?;

        // Over-fetch ids: some will be jobs, dead, or older than `since`.
        let candidates: Vec<u64> = ids.into_iter().take(limit.saturating_mul(2)).collect();

        let fetched: Vec<(usize, Option<HnItem>)> = stream::iter(candidates.into_iter().enumerate())
            .map(|(rank, id)| async move { (rank, self.fetch_item(id).await) })
            .buffer_unordered(ITEM_CONCURRENCY)
            .collect()
            .await;

        let mut ranked: Vec<(usize, HnItem)> = fetched
            .into_iter()
            .filter_map(|(rank, item)| item.map(|i| (rank, i)))
            .collect();
        ranked.sort_by_key(|(rank, _)| *rank);

        let items = ranked
            .into_iter()
            .filter_map(|(rank, item)| to_raw_item(item, rank))
            .filter(|item| item.posted_at.is_none_or(|at| at >= since))
            .take(limit)
            .collect();

        Ok(items)
    }

    async fn fetch_item(&self, id: u64) -> Option<HnItem> {
        let url = join(&self.base_url, &format!("v0/item/{id}.json")).ok()?;
        match get_json::<Option<HnItem>>(Source::Hackernews, self.client.get(url)).await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(source = "hackernews", id, error = %e, "story lookup failed");
                None
            }
        }
    }
}

fn to_raw_item(item: HnItem, rank: usize) -> Option<RawItem> {
    if item.dead || item.deleted || item.kind.as_deref().is_some_and(|k| k != "story") {
        return None;
    }
    let title = tidy_text(item.title.as_deref()?, 500);
    if title.is_empty() {
        return None;
    }

    let discussion = format!("https://news.ycombinator.com/item?id={}", item.id);
    let score = item.score.unwrap_or(0).max(0);
    let comments = item.descendants.unwrap_or(0).max(0);

    let mut metadata = Map::new();
    metadata.insert("rank".to_string(), json!(rank + 1));
    metadata.insert("score".to_string(), json!(score));
    metadata.insert("comments".to_string(), json!(comments));
    metadata.insert("discussion_url".to_string(), json!(discussion));
    if let Some(by) = item.by {
        metadata.insert("author".to_string(), json!(by));
    }

    #[allow(clippy::cast_precision_loss)]
    let engagement_score = (score + comments) as f64;

    Some(RawItem {
        external_id: Some(item.id.to_string()),
        text: title,
        url: item.url.filter(|u| !u.is_empty()).unwrap_or(discussion),
        posted_at: item.time.and_then(|t| Utc.timestamp_opt(t, 0).single()),
        engagement_score,
        metadata,
    })
}
