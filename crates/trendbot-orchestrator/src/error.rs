use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;
use trendbot_core::JobName;
use trendbot_db::DbError;
use trendbot_publisher::PublishError;
use trendbot_sources::SourceError;
use trendbot_summarizer::SummarizerError;

/// Why a pipeline invocation produced no result.
///
/// Only [`PipelineError::Store`] means the persistence layer is broken;
/// the other variants are contained outcomes for one window or trigger.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store failure: {0}")]
    Store(#[from] DbError),

    #[error("no trend items observed in [{window_start}, {window_end})")]
    InsufficientData {
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    },

    #[error("summarizer unavailable: {0}")]
    AnalysisUnavailable(#[from] SummarizerError),

    #[error("summarizer timed out after {}s", .0.as_secs())]
    AnalysisTimeout(Duration),

    /// The trigger was a no-op because the job is already running.
    #[error("{0} job is already running")]
    AlreadyRunning(JobName),

    /// The pipeline task panicked; the run was recorded as a failure.
    #[error("{job} run aborted: {detail}")]
    Aborted { job: JobName, detail: String },
}

/// Failures while wiring collaborators from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("source setup failed: {0}")]
    Sources(#[from] SourceError),

    #[error("summarizer setup failed: {0}")]
    Summarizer(#[from] SummarizerError),

    #[error("publisher setup failed: {0}")]
    Publisher(#[from] PublishError),
}

/// Failures starting or stopping the timer loop.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is already started")]
    AlreadyStarted,

    #[error(transparent)]
    Cron(#[from] JobSchedulerError),

    #[error(transparent)]
    Store(#[from] DbError),
}
