//! Trend source adapters and the per-source rate limiter that gates them.

pub mod adapters;
pub mod error;
pub mod rate_limit;

use std::collections::BTreeMap;

use trendbot_core::{AppConfig, Source};

pub use adapters::{
    GithubAdapter, HackernewsAdapter, HttpSettings, RedditAdapter, SourceAdapter, TwitterAdapter,
};
pub use error::SourceError;
pub use rate_limit::{Permit, Quota, RateLimited, RateLimiter};

/// The adapters available for collection, at most one per source.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    adapters: BTreeMap<Source, SourceAdapter>,
}

impl SourceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every source the configuration can serve.
    ///
    /// Twitter needs a bearer token and is left out, with a log line, when
    /// none is configured. The other sources work unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if an HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, SourceError> {
        let http = HttpSettings {
            user_agent: config.user_agent.clone(),
            timeout_secs: config.source_timeout_secs,
        };

        let mut set = Self::new();
        match &config.twitter_bearer_token {
            Some(token) => set.insert(TwitterAdapter::new(
                &http,
                token.clone(),
                config.twitter_query.clone(),
            )?),
            None => tracing::info!(source = "twitter", "TWITTER_BEARER_TOKEN not set; source disabled"),
        }
        set.insert(GithubAdapter::new(&http, config.github_token.clone())?);
        set.insert(RedditAdapter::new(&http, config.reddit_subreddits.clone())?);
        set.insert(HackernewsAdapter::new(&http)?);
        Ok(set)
    }

    /// Add or replace the adapter for its source.
    pub fn insert(&mut self, adapter: impl Into<SourceAdapter>) {
        let adapter = adapter.into();
        self.adapters.insert(adapter.source(), adapter);
    }

    /// Builder form of [`SourceSet::insert`].
    #[must_use]
    pub fn with(mut self, adapter: impl Into<SourceAdapter>) -> Self {
        self.insert(adapter);
        self
    }

    #[must_use]
    pub fn get(&self, source: Source) -> Option<&SourceAdapter> {
        self.adapters.get(&source)
    }

    /// Sources with a registered adapter, in stable order.
    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        self.adapters.keys().copied().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
