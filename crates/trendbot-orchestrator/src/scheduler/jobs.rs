//! Running one job invocation and recording it as a `job_runs` row.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use trendbot_core::{AnalysisResult, JobName, JobOutcome, JobRun, PublicationReceipt, ReceiptStatus};
use trendbot_db::{DbError, PurgeCounts};

use super::state::SchedulerState;
use crate::collect::CollectionReport;
use crate::context::PipelineContext;
use crate::error::PipelineError;

/// What started a job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Schedule,
    Manual,
}

impl Trigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Schedule => "schedule",
            Trigger::Manual => "manual",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of asking the scheduler to run a job.
#[derive(Debug)]
pub enum Execution<T> {
    Finished { run: JobRun, output: T },
    /// The pipeline task panicked; `run` records the failure.
    Aborted { run: JobRun },
    /// The job was already running; nothing was started or recorded.
    SkippedOverlap,
}

impl<T> Execution<T> {
    #[must_use]
    pub fn into_run(self) -> Option<JobRun> {
        match self {
            Execution::Finished { run, .. } | Execution::Aborted { run } => Some(run),
            Execution::SkippedOverlap => None,
        }
    }
}

/// How a pipeline's return value is recorded on its job run.
pub trait JobOutput: Send + 'static {
    /// Outcome, error detail, and structured summary.
    fn record(&self) -> (JobOutcome, Option<String>, Value);
}

fn failure(e: &PipelineError) -> (JobOutcome, Option<String>, Value) {
    (JobOutcome::Failure, Some(e.to_string()), Value::Null)
}

impl JobOutput for Result<CollectionReport, PipelineError> {
    fn record(&self) -> (JobOutcome, Option<String>, Value) {
        match self {
            Ok(report) => (
                report.outcome(),
                report.error_summary(),
                serde_json::to_value(report).unwrap_or_default(),
            ),
            Err(e) => failure(e),
        }
    }
}

impl JobOutput for Result<AnalysisResult, PipelineError> {
    fn record(&self) -> (JobOutcome, Option<String>, Value) {
        match self {
            Ok(analysis) => (
                JobOutcome::Success,
                None,
                json!({
                    "analysis_id": analysis.id,
                    "items": analysis.source_item_ids.len(),
                    "moderation_passed": analysis.moderation_passed,
                }),
            ),
            // An empty window is "no data this cycle", not a broken job.
            Err(PipelineError::InsufficientData {
                window_start,
                window_end,
            }) => (
                JobOutcome::Success,
                None,
                json!({
                    "insufficient_data": true,
                    "window_start": window_start,
                    "window_end": window_end,
                }),
            ),
            Err(e) => failure(e),
        }
    }
}

impl JobOutput for Result<PublicationReceipt, PipelineError> {
    fn record(&self) -> (JobOutcome, Option<String>, Value) {
        match self {
            Ok(receipt) => {
                let outcome = if receipt.status == ReceiptStatus::Failed {
                    JobOutcome::Failure
                } else {
                    JobOutcome::Success
                };
                let detail = (receipt.status == ReceiptStatus::Failed)
                    .then(|| receipt.error_detail.clone())
                    .flatten();
                (
                    outcome,
                    detail,
                    json!({
                        "receipt_id": receipt.id,
                        "status": receipt.status,
                        "analysis_id": receipt.analysis_id,
                        "external_ref": receipt.external_ref,
                    }),
                )
            }
            Err(e) => failure(e),
        }
    }
}

impl JobOutput for Result<PurgeCounts, PipelineError> {
    fn record(&self) -> (JobOutcome, Option<String>, Value) {
        match self {
            Ok(counts) => (
                JobOutcome::Success,
                None,
                serde_json::to_value(counts).unwrap_or_default(),
            ),
            Err(e) => failure(e),
        }
    }
}

/// Run `pipeline` as one invocation of `job`.
///
/// Claims the in-process slot, then the `running` row, runs the pipeline on
/// its own task so a panic cannot leave the job stuck, and finalizes the
/// row with the recorded outcome. A row left `running` by an earlier failed
/// finalize is marked `failure` before the new row is opened.
///
/// # Errors
///
/// Returns [`DbError`] if the job run cannot be started or finalized.
pub(crate) async fn execute<T, F, Fut>(
    ctx: &Arc<PipelineContext>,
    state: &SchedulerState,
    job: JobName,
    trigger: Trigger,
    pipeline: F,
) -> Result<Execution<T>, DbError>
where
    T: JobOutput,
    F: FnOnce(Arc<PipelineContext>) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let now = Utc::now();
    let Some(_slot) = state.try_begin(job, now) else {
        tracing::info!(%job, %trigger, "scheduler: job already running; trigger skipped");
        return Ok(Execution::SkippedOverlap);
    };

    if let Some(stale) = state.unfinished_run(job) {
        trendbot_db::fail_stale_job_run(&ctx.pool, stale, now)
            .await
            .inspect_err(|e| {
                tracing::error!(%job, run_id = stale, error = %e, "scheduler: could not close unfinished run");
            })?;
        state.forget_unfinished(job);
        tracing::warn!(%job, run_id = stale, "scheduler: closed run whose outcome was never recorded");
    }

    let run = match trendbot_db::start_job_run(&ctx.pool, job, trigger.as_str(), now).await {
        Ok(run) => run,
        Err(DbError::JobAlreadyRunning(_)) => {
            tracing::info!(%job, %trigger, "scheduler: job running in another process; trigger skipped");
            return Ok(Execution::SkippedOverlap);
        }
        Err(e) => {
            tracing::error!(%job, error = %e, "scheduler: could not record job start");
            return Err(e);
        }
    };
    tracing::info!(%job, %trigger, run_id = %run.public_id, "scheduler: job started");

    let joined = tokio::spawn(pipeline(Arc::clone(ctx))).await;

    let (output, (outcome, error_detail, summary)) = match joined {
        Ok(output) => {
            let recorded = output.record();
            (Some(output), recorded)
        }
        Err(e) => (
            None,
            (
                JobOutcome::Failure,
                Some(format!("pipeline task failed: {e}")),
                Value::Null,
            ),
        ),
    };

    let finished = trendbot_db::finish_job_run(
        &ctx.pool,
        run.id,
        outcome,
        error_detail.as_deref(),
        &summary,
        Utc::now(),
    )
    .await
    .inspect_err(|e| {
        state.remember_unfinished(job, run.id);
        tracing::error!(%job, run_id = %run.public_id, error = %e, "scheduler: could not record job outcome");
    })?;

    match outcome {
        JobOutcome::Failure => tracing::warn!(
            %job,
            run_id = %finished.public_id,
            error = error_detail.as_deref().unwrap_or(""),
            "scheduler: job failed"
        ),
        _ => tracing::info!(%job, run_id = %finished.public_id, %outcome, "scheduler: job finished"),
    }

    Ok(match output {
        Some(output) => Execution::Finished {
            run: finished,
            output,
        },
        None => Execution::Aborted { run: finished },
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local};

    use super::*;

    #[test]
    fn empty_window_is_recorded_as_success() {
        let now = Utc::now();
        let result: Result<AnalysisResult, PipelineError> = Err(PipelineError::InsufficientData {
            window_start: now - Duration::hours(1),
            window_end: now,
        });
        let (outcome, detail, summary) = result.record();
        assert_eq!(outcome, JobOutcome::Success);
        assert!(detail.is_none());
        assert_eq!(summary["insufficient_data"], true);
    }

    #[test]
    fn failed_receipt_fails_the_job() {
        let receipt = PublicationReceipt {
            id: 1,
            analysis_id: Some(2),
            published_at: Utc::now(),
            publish_day: Local::now().date_naive(),
            status: ReceiptStatus::Failed,
            external_ref: None,
            content: Some("x 🤖".to_string()),
            error_detail: Some("publisher unavailable".to_string()),
        };
        let (outcome, detail, summary) = Ok::<_, PipelineError>(receipt.clone()).record();
        assert_eq!(outcome, JobOutcome::Failure);
        assert_eq!(detail.as_deref(), Some("publisher unavailable"));
        assert_eq!(summary["status"], "failed");

        let skipped = PublicationReceipt {
            status: ReceiptStatus::SkippedQuota,
            ..receipt
        };
        assert_eq!(Ok::<_, PipelineError>(skipped).record().0, JobOutcome::Success);
    }
}
