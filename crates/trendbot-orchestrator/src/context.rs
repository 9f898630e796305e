//! Everything a pipeline invocation needs, bundled for injection.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::NaiveTime;
use sqlx::SqlitePool;
use trendbot_core::{AppConfig, Source};
use trendbot_publisher::Publisher;
use trendbot_sources::{RateLimiter, SourceSet};
use trendbot_summarizer::Summarizer;

use crate::error::SetupError;

const DEFAULT_SOURCE_LIMIT: usize = 20;

/// Tunables the pipelines read on every invocation.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source_limits: BTreeMap<Source, usize>,
    pub source_timeout: Duration,
    pub analysis_hours_back: u32,
    pub analysis_max_items: usize,
    pub summarize_timeout: Duration,
    pub publish_timeout: Duration,
    pub daily_post_limit: u32,
    pub retention_days: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            source_limits: BTreeMap::new(),
            source_timeout: Duration::from_secs(30),
            analysis_hours_back: 24,
            analysis_max_items: 30,
            summarize_timeout: Duration::from_secs(60),
            publish_timeout: Duration::from_secs(30),
            daily_post_limit: 3,
            retention_days: 30,
        }
    }
}

impl PipelineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            source_limits: config.sources.iter().map(|(s, v)| (*s, v.limit)).collect(),
            source_timeout: Duration::from_secs(config.source_timeout_secs),
            analysis_hours_back: config.analysis_hours_back,
            analysis_max_items: config.analysis_max_items,
            summarize_timeout: Duration::from_secs(config.summarizer.timeout_secs),
            publish_timeout: Duration::from_secs(config.publisher.timeout_secs),
            daily_post_limit: config.daily_post_limit,
            retention_days: config.retention_days,
        }
    }

    #[must_use]
    pub fn limit_for(&self, source: Source) -> usize {
        self.source_limits
            .get(&source)
            .copied()
            .unwrap_or(DEFAULT_SOURCE_LIMIT)
    }
}

/// When the timer loop fires each job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub collection_every: Duration,
    pub analysis_every: Duration,
    pub cleanup_every: Duration,
    /// Site-local times of day.
    pub publish_times: Vec<NaiveTime>,
}

impl ScheduleSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        let hours = |h: u64| Duration::from_secs(h.saturating_mul(3600));
        Self {
            collection_every: hours(config.collection_interval_hours),
            analysis_every: hours(config.analysis_interval_hours),
            cleanup_every: hours(config.cleanup_interval_hours),
            publish_times: config.publish_times.clone(),
        }
    }
}

/// Store handle plus the external collaborators.
#[derive(Debug)]
pub struct PipelineContext {
    pub pool: SqlitePool,
    pub sources: SourceSet,
    pub limiter: RateLimiter,
    pub summarizer: Summarizer,
    pub publisher: Publisher,
    pub settings: PipelineSettings,
}

impl PipelineContext {
    /// Build every collaborator from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if an HTTP client cannot be constructed.
    pub fn from_config(pool: SqlitePool, config: &AppConfig) -> Result<Self, SetupError> {
        Ok(Self {
            pool,
            sources: SourceSet::from_config(config)?,
            limiter: RateLimiter::from_config(config),
            summarizer: Summarizer::from_settings(&config.summarizer)?,
            publisher: Publisher::from_settings(&config.publisher)?,
            settings: PipelineSettings::from_app_config(config),
        })
    }
}
