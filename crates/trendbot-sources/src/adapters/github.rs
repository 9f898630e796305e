//! GitHub trending repositories via the search API.
//!
//! "Trending" is approximated as recently created repositories ordered by
//! stars, which is what the public search endpoint can express.

use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Map};
use trendbot_core::{RawItem, Source};

use super::{build_client, get_json, join, normalise_base_url, tidy_text, HttpSettings};
use crate::error::SourceError;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repository>,
}

#[derive(Debug, Deserialize)]
struct Repository {
    id: u64,
    full_name: String,
    html_url: String,
    description: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct GithubAdapter {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for GithubAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubAdapter")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish_non_exhaustive()
    }
}

impl GithubAdapter {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(settings: &HttpSettings, token: Option<String>) -> Result<Self, SourceError> {
        Self::with_base_url(settings, token, DEFAULT_BASE_URL)
    }

    /// Point the adapter at a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the client cannot be built or the URL is invalid.
    pub fn with_base_url(
        settings: &HttpSettings,
        token: Option<String>,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(settings)?,
            base_url: normalise_base_url(base_url)?,
            token,
        })
    }

    pub(crate) async fn fetch(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RawItem>, SourceError> {
        let mut url = join(&self.base_url, "search/repositories")?;
        url.query_pairs_mut()
            .append_pair("q", &format!("created:>={}", since.format("%Y-%m-%d")))
            .append_pair("sort", "stars")
            .append_pair("order", "desc")
            .append_pair("per_page", &limit.min(MAX_PER_PAGE).to_string());

        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response: SearchResponse = get_json(Source::Github, request).await?;

        Ok(response
            .items
            .into_iter()
            .take(limit)
            .map(to_raw_item)
            .collect())
    }
}

fn to_raw_item(repo: Repository) -> RawItem {
    let text = match repo.description.as_deref().map(str::trim) {
        Some(desc) if !desc.is_empty() => format!("{}: {}", repo.full_name, tidy_text(desc, 400)),
        _ => repo.full_name.clone(),
    };

    let mut metadata = Map::new();
    metadata.insert("full_name".to_string(), json!(repo.full_name));
    metadata.insert("stars".to_string(), json!(repo.stargazers_count));
    metadata.insert("forks".to_string(), json!(repo.forks_count));
    if let Some(language) = repo.language {
        metadata.insert("language".to_string(), json!(language));
    }
    if !repo.topics.is_empty() {
        metadata.insert("topics".to_string(), json!(repo.topics));
    }
    if let Some(created_at) = repo.created_at {
        metadata.insert("created_at".to_string(), json!(created_at.to_rfc3339()));
    }

    #[allow(clippy::cast_precision_loss)]
    let engagement_score = (repo.stargazers_count + repo.forks_count) as f64;

    RawItem {
        external_id: Some(repo.id.to_string()),
        text,
        url: repo.html_url,
        // Star activity is current, not tied to the creation date.
        posted_at: None,
        engagement_score,
        metadata,
    }
}
