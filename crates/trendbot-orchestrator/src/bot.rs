//! Front-end surface: every operation is a manual trigger through the
//! scheduler, so manual runs obey the same mutual exclusion as timers.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use trendbot_core::{AnalysisResult, AppConfig, JobName, JobRun, PublicationReceipt};
use trendbot_db::{DbError, PurgeCounts};

use crate::collect::{collect, CollectRequest, CollectionReport};
use crate::context::{PipelineContext, ScheduleSettings};
use crate::error::{PipelineError, SchedulerError, SetupError};
use crate::report::{build_report, TrendReport};
use crate::scheduler::{Execution, Scheduler, SchedulerStatus};
use crate::{analyze, cleanup, publish};

/// How one step of a full cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CycleStep<T> {
    Completed(T),
    /// The step had nothing to do, or its job was already running.
    Skipped(String),
    Failed(String),
}

impl<T> CycleStep<T> {
    fn from_result(result: Result<T, PipelineError>) -> Result<Self, PipelineError> {
        match result {
            Ok(value) => Ok(CycleStep::Completed(value)),
            Err(e @ PipelineError::Store(_)) => Err(e),
            Err(e @ (PipelineError::InsufficientData { .. } | PipelineError::AlreadyRunning(_))) => {
                Ok(CycleStep::Skipped(e.to_string()))
            }
            Err(e) => Ok(CycleStep::Failed(e.to_string())),
        }
    }
}

/// Collect, analyze, then publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub collection: CycleStep<CollectionReport>,
    pub analysis: CycleStep<AnalysisResult>,
    pub publication: CycleStep<PublicationReceipt>,
}

#[derive(Debug)]
pub struct TrendBot {
    scheduler: Scheduler,
}

impl TrendBot {
    #[must_use]
    pub fn new(ctx: PipelineContext, schedule: ScheduleSettings) -> Self {
        Self {
            scheduler: Scheduler::new(Arc::new(ctx), schedule),
        }
    }

    /// Wire every collaborator from `config` around an open pool.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if a collaborator cannot be constructed.
    pub fn from_config(pool: SqlitePool, config: &AppConfig) -> Result<Self, SetupError> {
        Ok(Self::new(
            PipelineContext::from_config(pool, config)?,
            ScheduleSettings::from_app_config(config),
        ))
    }

    #[must_use]
    pub fn context(&self) -> &PipelineContext {
        self.scheduler.context()
    }

    /// Sweep every configured source once.
    ///
    /// # Errors
    ///
    /// See [`TrendBot::collect_with`].
    pub async fn collect(&self) -> Result<CollectionReport, PipelineError> {
        self.collect_with(CollectRequest::default()).await
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] if collection is in
    /// progress, or [`PipelineError::Store`] if the store fails.
    pub async fn collect_with(
        &self,
        request: CollectRequest,
    ) -> Result<CollectionReport, PipelineError> {
        let execution = self
            .scheduler
            .trigger(JobName::Collection, move |ctx| async move {
                collect(&ctx, &request, Utc::now()).await
            })
            .await;
        settle(JobName::Collection, execution)
    }

    /// Analyse the last `hours_back` hours.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InsufficientData`] for an empty window, plus
    /// the failures listed on [`analyze::analyze`].
    pub async fn analyze(&self, hours_back: u32) -> Result<AnalysisResult, PipelineError> {
        let execution = self
            .scheduler
            .trigger(JobName::Analysis, move |ctx| async move {
                analyze::analyze(&ctx, hours_back, Utc::now()).await
            })
            .await;
        settle(JobName::Analysis, execution)
    }

    /// Make one publish decision.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] or [`PipelineError::Store`].
    pub async fn publish(&self) -> Result<PublicationReceipt, PipelineError> {
        let execution = self
            .scheduler
            .trigger(JobName::Publishing, |ctx| async move {
                publish::publish_latest(&ctx, Utc::now()).await
            })
            .await;
        settle(JobName::Publishing, execution)
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::AlreadyRunning`] or [`PipelineError::Store`].
    pub async fn cleanup(&self, retention_days: u32) -> Result<PurgeCounts, PipelineError> {
        let execution = self
            .scheduler
            .trigger(JobName::Cleanup, move |ctx| async move {
                cleanup::cleanup(&ctx, retention_days, Utc::now()).await
            })
            .await;
        settle(JobName::Cleanup, execution)
    }

    /// Collect, analyze the configured window, then publish.
    ///
    /// Publishing is attempted even when analysis produced nothing new,
    /// since an earlier analysis may still be eligible.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] as soon as any step hits a store
    /// failure; other step failures are reported in the [`CycleReport`].
    pub async fn run_full_cycle(&self) -> Result<CycleReport, PipelineError> {
        let hours_back = self.context().settings.analysis_hours_back;

        let collection = CycleStep::from_result(self.collect().await)?;
        let analysis = CycleStep::from_result(self.analyze(hours_back).await)?;
        let publication = CycleStep::from_result(self.publish().await)?;

        Ok(CycleReport {
            collection,
            analysis,
            publication,
        })
    }

    /// # Errors
    ///
    /// Returns [`DbError`] if job history cannot be read.
    pub async fn status(&self) -> Result<SchedulerStatus, DbError> {
        self.scheduler.status().await
    }

    /// # Errors
    ///
    /// Returns [`DbError`] if the job run cannot be recorded.
    pub async fn run_now(&self, job: JobName) -> Result<Option<JobRun>, DbError> {
        self.scheduler.run_now(job).await
    }

    /// # Errors
    ///
    /// See [`Scheduler::start`].
    pub async fn start_scheduled_operation(&self) -> Result<(), SchedulerError> {
        self.scheduler.start().await
    }

    /// # Errors
    ///
    /// See [`Scheduler::stop`].
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        self.scheduler.stop().await
    }

    /// Read-only markdown report of the latest analysis.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if a query fails.
    pub async fn report(&self, hours_back: u32) -> Result<TrendReport, DbError> {
        build_report(&self.context().pool, hours_back, Utc::now()).await
    }
}

fn settle<T>(
    job: JobName,
    execution: Result<Execution<Result<T, PipelineError>>, DbError>,
) -> Result<T, PipelineError> {
    match execution? {
        Execution::Finished { output, .. } => output,
        Execution::Aborted { run } => Err(PipelineError::Aborted {
            job,
            detail: run.error_detail.unwrap_or_default(),
        }),
        Execution::SkippedOverlap => Err(PipelineError::AlreadyRunning(job)),
    }
}
