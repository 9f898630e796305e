//! Job scheduler.
//!
//! Owns recurring and manual execution of the pipelines. Every trigger,
//! timer or manual, goes through the same per-job slot, so a job never runs
//! concurrently with itself; different jobs may overlap freely. A failed
//! run is recorded and the job returns to idle, and the next tick simply
//! starts fresh.

mod jobs;
mod state;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Local, Timelike, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use trendbot_core::{JobName, JobOutcome, JobRun};
use trendbot_db::DbError;
use uuid::Uuid;

pub use jobs::{Execution, JobOutput, Trigger};
pub use state::{JobSlot, SchedulerState};

use crate::collect::{collect, CollectRequest};
use crate::context::{PipelineContext, ScheduleSettings};
use crate::error::SchedulerError;
use crate::{analyze, cleanup, publish};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
}

/// Status line for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub job: JobName,
    pub state: JobState,
    pub last_outcome: Option<JobOutcome>,
    pub last_error: Option<String>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    /// `None` while the timer loop is stopped.
    pub next_fire_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerStatus {
    pub timers_active: bool,
    pub jobs: Vec<JobStatus>,
}

struct Timers {
    cron: JobScheduler,
    jobs: Vec<(JobName, Uuid)>,
}

pub struct Scheduler {
    ctx: Arc<PipelineContext>,
    state: Arc<SchedulerState>,
    schedule: ScheduleSettings,
    timers: Mutex<Option<Timers>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("schedule", &self.schedule)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    #[must_use]
    pub fn new(ctx: Arc<PipelineContext>, schedule: ScheduleSettings) -> Self {
        Self {
            ctx,
            state: Arc::new(SchedulerState::new()),
            schedule,
            timers: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn context(&self) -> &Arc<PipelineContext> {
        &self.ctx
    }

    /// Run `pipeline` as a manual invocation of `job`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the job run cannot be recorded.
    pub async fn trigger<T, F, Fut>(&self, job: JobName, pipeline: F) -> Result<Execution<T>, DbError>
    where
        T: JobOutput,
        F: FnOnce(Arc<PipelineContext>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        jobs::execute(&self.ctx, &self.state, job, Trigger::Manual, pipeline).await
    }

    /// Run `job` now with its configured parameters, obeying mutual
    /// exclusion. `None` means the trigger was skipped because the job was
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the job run cannot be recorded.
    pub async fn run_now(&self, job: JobName) -> Result<Option<JobRun>, DbError> {
        run_job(&self.ctx, &self.state, job, Trigger::Manual).await
    }

    /// Start the timer loop. Runs left `running` and abandoned `pending`
    /// receipts from a previous process are marked failed first.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyStarted`] on a second call, or a
    /// store or cron error if setup fails.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut timers = self.timers.lock().await;
        if timers.is_some() {
            return Err(SchedulerError::AlreadyStarted);
        }

        let interrupted = trendbot_db::fail_interrupted_job_runs(&self.ctx.pool, Utc::now()).await?;
        if interrupted > 0 {
            tracing::warn!(interrupted, "scheduler: marked interrupted job runs as failed");
        }
        publish::release_stale_reservations(&self.ctx, Utc::now()).await?;

        let cron = JobScheduler::new().await?;
        let mut registered = Vec::new();

        for (job, every) in [
            (JobName::Collection, self.schedule.collection_every),
            (JobName::Analysis, self.schedule.analysis_every),
            (JobName::Cleanup, self.schedule.cleanup_every),
        ] {
            let (ctx, state) = (Arc::clone(&self.ctx), Arc::clone(&self.state));
            let timer = Job::new_repeated_async(every, move |_uuid, _lock| {
                let (ctx, state) = (Arc::clone(&ctx), Arc::clone(&state));
                Box::pin(async move { fire(&ctx, &state, job).await })
            })?;
            registered.push((job, cron.add(timer).await?));
            tracing::info!(%job, every_secs = every.as_secs(), "scheduler: registered interval job");
        }

        for time in &self.schedule.publish_times {
            let expr = format!("0 {} {} * * *", time.minute(), time.hour());
            let (ctx, state) = (Arc::clone(&self.ctx), Arc::clone(&self.state));
            let timer = Job::new_async_tz(expr.as_str(), Local, move |_uuid, _lock| {
                let (ctx, state) = (Arc::clone(&ctx), Arc::clone(&state));
                Box::pin(async move { fire(&ctx, &state, JobName::Publishing).await })
            })?;
            registered.push((JobName::Publishing, cron.add(timer).await?));
            tracing::info!(cron = %expr, "scheduler: registered publishing job");
        }

        cron.start().await?;
        *timers = Some(Timers {
            cron,
            jobs: registered,
        });
        tracing::info!("scheduler: started");
        Ok(())
    }

    /// Stop firing timers, then wait for in-flight jobs to finish. Jobs are
    /// never cancelled mid-pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Cron`] if the timer loop fails to shut down.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let taken = self.timers.lock().await.take();
        if let Some(mut timers) = taken {
            timers.cron.shutdown().await?;
            tracing::info!("scheduler: timers stopped; waiting for running jobs");
        }
        self.state.wait_idle().await;
        tracing::info!("scheduler: stopped");
        Ok(())
    }

    /// State, last outcome, and next fire time for every job.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if job history cannot be read.
    pub async fn status(&self) -> Result<SchedulerStatus, DbError> {
        let (timers_active, next_fire) = self.next_fire_times().await;

        let mut jobs = Vec::with_capacity(JobName::ALL.len());
        for job in JobName::ALL {
            let latest = trendbot_db::latest_job_run(&self.ctx.pool, job).await?;
            let finished = trendbot_db::latest_finished_job_run(&self.ctx.pool, job).await?;

            // A row this process failed to finalize is not a live run.
            let unfinished = self.state.unfinished_run(job);
            let running_elsewhere = latest.as_ref().is_some_and(|run| {
                run.outcome == JobOutcome::Running && unfinished != Some(run.id)
            });
            let state = if self.state.running_since(job).is_some() || running_elsewhere {
                JobState::Running
            } else {
                JobState::Idle
            };

            jobs.push(JobStatus {
                job,
                state,
                last_outcome: finished.as_ref().map(|run| run.outcome),
                last_error: finished.as_ref().and_then(|run| run.error_detail.clone()),
                last_started_at: latest.as_ref().map(|run| run.started_at),
                last_finished_at: finished.as_ref().and_then(|run| run.finished_at),
                next_fire_time: next_fire.get(&job).copied(),
            });
        }

        Ok(SchedulerStatus {
            timers_active,
            jobs,
        })
    }

    async fn next_fire_times(&self) -> (bool, BTreeMap<JobName, DateTime<Utc>>) {
        let mut guard = self.timers.lock().await;
        let Some(timers) = guard.as_mut() else {
            return (false, BTreeMap::new());
        };

        let mut next: BTreeMap<JobName, DateTime<Utc>> = BTreeMap::new();
        for (job, id) in &timers.jobs {
            match timers.cron.next_tick_for_job(*id).await {
                Ok(Some(tick)) => {
                    next.entry(*job)
                        .and_modify(|t| *t = (*t).min(tick))
                        .or_insert(tick);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(%job, error = %e, "scheduler: could not read next tick"),
            }
        }
        (true, next)
    }
}

/// Timer callback: run `job` with its configured parameters.
async fn fire(ctx: &Arc<PipelineContext>, state: &SchedulerState, job: JobName) {
    if let Err(e) = run_job(ctx, state, job, Trigger::Schedule).await {
        tracing::error!(%job, error = %e, "scheduler: scheduled run could not be recorded");
    }
}

async fn run_job(
    ctx: &Arc<PipelineContext>,
    state: &SchedulerState,
    job: JobName,
    trigger: Trigger,
) -> Result<Option<JobRun>, DbError> {
    let hours_back = ctx.settings.analysis_hours_back;
    let retention_days = ctx.settings.retention_days;

    let run = match job {
        JobName::Collection => jobs::execute(ctx, state, job, trigger, |ctx| async move {
            collect(&ctx, &CollectRequest::default(), Utc::now()).await
        })
        .await?
        .into_run(),
        JobName::Analysis => jobs::execute(ctx, state, job, trigger, move |ctx| async move {
            analyze::analyze(&ctx, hours_back, Utc::now()).await
        })
        .await?
        .into_run(),
        JobName::Publishing => jobs::execute(ctx, state, job, trigger, |ctx| async move {
            publish::publish_latest(&ctx, Utc::now()).await
        })
        .await?
        .into_run(),
        JobName::Cleanup => jobs::execute(ctx, state, job, trigger, move |ctx| async move {
            cleanup::cleanup(&ctx, retention_days, Utc::now()).await
        })
        .await?
        .into_run(),
    };
    Ok(run)
}
