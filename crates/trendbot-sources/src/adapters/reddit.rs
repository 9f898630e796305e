//! Reddit hot listings via the public JSON endpoints.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map};
use trendbot_core::{RawItem, Source};

use super::{build_client, get_json, join, normalise_base_url, tidy_text, HttpSettings};
use crate::error::SourceError;

const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
const MAX_PER_LISTING: usize = 100;

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    name: String,
    title: String,
    permalink: String,
    subreddit: Option<String>,
    author: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    created_utc: Option<f64>,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    over_18: bool,
}

#[derive(Debug, Clone)]
pub struct RedditAdapter {
    client: Client,
    base_url: Url,
    subreddits: Vec<String>,
}

impl RedditAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings, subreddits: Vec<String>) -> Result<Self, SourceError> {
        Self::with_base_url(settings, subreddits, DEFAULT_BASE_URL)
    }

    /// Point the adapter at a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the client cannot be built or the URL is invalid.
    pub fn with_base_url(
        settings: &HttpSettings,
        subreddits: Vec<String>,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: normalise_base_url(base_url)?,
            subreddits,
        })
    }

    /// Fetch hot posts, splitting `limit` evenly across subreddits.
    ///
    /// A failing subreddit is skipped with a warning. The fetch fails only
    /// when every subreddit fails.
    pub(crate) async fn fetch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        if self.subreddits.is_empty() {
            return Err(SourceError::NotConfigured(
                Source::Reddit,
                "no subreddits configured",
            ));
        }

        let per_listing = limit.div_ceil(self.subreddits.len()).clamp(1, MAX_PER_LISTING);
        let mut items = Vec::new();
        let mut last_error = None;
        let mut any_ok = false;

        for subreddit in &self.subreddits {
            match self.fetch_listing(subreddit, per_listing).await {
                Ok(posts) => {
                    any_ok = true;
                    tracing::debug!(source = "reddit", subreddit, count = posts.len(), "fetched listing");
                    items.extend(
                        posts
                            .into_iter()
                            .filter(|p| !p.stickied && !p.over_18)
                            .map(to_raw_item)
                            .filter(|item| item.posted_at.is_none_or(|at| at >= since)),
                    );
                }
                Err(e) => {
                    tracing::warn!(source = "reddit", subreddit, error = %e, "listing fetch failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        if !any_ok {
            return Err(SourceError::AllRequestsFailed {
                feed: Source::Reddit,
                last_error: last_error.unwrap_or_default(),
            });
        }

        items.sort_by(|a, b| b.engagement_score.total_cmp(&a.engagement_score));
        items.truncate(limit);
        Ok(items)
    }

    async fn fetch_listing(&self, subreddit: &str, limit: usize) -> Result<Vec<Post>, SourceError> {
        let mut url = join(&self.base_url, &format!("r/{subreddit}/hot.json"))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("raw_json", "1");

        let listing: Listing = get_json(Source::Reddit, self.client.get(url)).await?;
        Ok(listing.data.children.into_iter().map(|c| c.data).collect())
    }
}

fn to_raw_item(post: Post) -> RawItem {
    let score = post.score.max(0);
    let comments = post.num_comments.max(0);

    let mut metadata = Map::new();
    metadata.insert("score".to_string(), json!(score));
    metadata.insert("comments".to_string(), json!(comments));
    if let Some(subreddit) = post.subreddit {
        metadata.insert("subreddit".to_string(), json!(subreddit));
    }
    if let Some(author) = post.author {
        metadata.insert("author".to_string(), json!(author));
    }

    #[allow(clippy::cast_possible_truncation)]
    let posted_at = post
        .created_utc
        .filter(|t| t.is_finite())
        .and_then(|t| Utc.timestamp_opt(t as i64, 0).single());

    #[allow(clippy::cast_precision_loss)]
    let engagement_score = (score + comments) as f64;

    RawItem {
        external_id: Some(post.name),
        text: tidy_text(&post.title, 500),
        url: format!("https://www.reddit.com{}", post.permalink),
        posted_at,
        engagement_score,
        metadata,
    }
}
