use std::collections::BTreeMap;

use chrono::NaiveTime;

use crate::items::Source;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Fetch limit and rate-limit quota for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSettings {
    /// Maximum items requested per collection run.
    pub limit: usize,
    /// Calls allowed per rolling window.
    pub rate_max_calls: u32,
    pub rate_window_secs: u64,
}

#[derive(Clone)]
pub struct SummarizerSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SummarizerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizerSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct PublisherSettings {
    pub access_token: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for PublisherSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherSettings")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub sources: BTreeMap<Source, SourceSettings>,
    pub source_timeout_secs: u64,
    pub user_agent: String,
    pub twitter_bearer_token: Option<String>,
    pub github_token: Option<String>,
    pub twitter_query: String,
    pub reddit_subreddits: Vec<String>,
    pub daily_post_limit: u32,
    pub collection_interval_hours: u64,
    pub analysis_interval_hours: u64,
    pub analysis_hours_back: u32,
    pub analysis_max_items: usize,
    /// Site-local times of day at which publishing fires.
    pub publish_times: Vec<NaiveTime>,
    pub cleanup_interval_hours: u64,
    pub retention_days: u32,
    pub summarizer: SummarizerSettings,
    pub publisher: PublisherSettings,
}

impl AppConfig {
    /// Settings for `source`. Every source is populated at load time; the
    /// fallback only guards hand-built configs.
    #[must_use]
    pub fn source_settings(&self, source: Source) -> SourceSettings {
        self.sources
            .get(&source)
            .copied()
            .unwrap_or(SourceSettings {
                limit: 20,
                rate_max_calls: 30,
                rate_window_secs: 60,
            })
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("sources", &self.sources)
            .field("source_timeout_secs", &self.source_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field(
                "twitter_bearer_token",
                &self.twitter_bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .field(
                "github_token",
                &self.github_token.as_ref().map(|_| "[redacted]"),
            )
            .field("twitter_query", &self.twitter_query)
            .field("reddit_subreddits", &self.reddit_subreddits)
            .field("daily_post_limit", &self.daily_post_limit)
            .field("collection_interval_hours", &self.collection_interval_hours)
            .field("analysis_interval_hours", &self.analysis_interval_hours)
            .field("analysis_hours_back", &self.analysis_hours_back)
            .field("analysis_max_items", &self.analysis_max_items)
            .field("publish_times", &self.publish_times)
            .field("cleanup_interval_hours", &self.cleanup_interval_hours)
            .field("retention_days", &self.retention_days)
            .field("summarizer", &self.summarizer)
            .field("publisher", &self.publisher)
            .finish()
    }
}
