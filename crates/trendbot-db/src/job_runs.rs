//! Database operations for `job_runs`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;
use trendbot_core::{JobName, JobOutcome, JobRun};
use uuid::Uuid;

use crate::{is_unique_violation, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRunRow {
    id: i64,
    public_id: Uuid,
    job_name: String,
    trigger_source: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    outcome: String,
    error_detail: Option<String>,
    summary: Option<Json<Value>>,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = DbError;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        Ok(JobRun {
            id: row.id,
            public_id: row.public_id,
            job_name: row.job_name.parse::<JobName>()?,
            trigger_source: row.trigger_source,
            started_at: row.started_at,
            finished_at: row.finished_at,
            outcome: row.outcome.parse::<JobOutcome>()?,
            error_detail: row.error_detail,
            summary: row.summary.map_or(Value::Null, |s| s.0),
        })
    }
}

const JOB_RUN_COLUMNS: &str = "id, public_id, job_name, trigger_source, started_at, finished_at, \
                               outcome, error_detail, summary";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Record the start of a run of `job` in `running` state.
///
/// # Errors
///
/// Returns [`DbError::JobAlreadyRunning`] if another run of `job` is still
/// `running`, or [`DbError::Sqlx`] if the insert fails.
pub async fn start_job_run(
    pool: &SqlitePool,
    job: JobName,
    trigger_source: &str,
    now: DateTime<Utc>,
) -> Result<JobRun, DbError> {
    let result = sqlx::query_as::<_, JobRunRow>(&format!(
        "INSERT INTO job_runs (public_id, job_name, trigger_source, started_at, outcome) \
         VALUES (?1, ?2, ?3, ?4, 'running') \
         RETURNING {JOB_RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(job.as_str())
    .bind(trigger_source)
    .bind(now)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => row.try_into(),
        Err(e) if is_unique_violation(&e) => Err(DbError::JobAlreadyRunning(job)),
        Err(e) => Err(e.into()),
    }
}

/// Move a `running` run to its final outcome.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the run is not `running`, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn finish_job_run(
    pool: &SqlitePool,
    id: i64,
    outcome: JobOutcome,
    error_detail: Option<&str>,
    summary: &Value,
    now: DateTime<Utc>,
) -> Result<JobRun, DbError> {
    let row = sqlx::query_as::<_, JobRunRow>(&format!(
        "UPDATE job_runs \
         SET outcome = ?1, error_detail = ?2, summary = ?3, finished_at = ?4 \
         WHERE id = ?5 AND outcome = 'running' \
         RETURNING {JOB_RUN_COLUMNS}"
    ))
    .bind(outcome.as_str())
    .bind(error_detail)
    .bind(Json(summary))
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidTransition {
        table: "job_runs",
        id,
        expected_status: "running",
    })?;

    row.try_into()
}

/// Mark every `running` row as `failure`. Called once at process start,
/// when no run can legitimately be in flight.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_interrupted_job_runs(
    pool: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE job_runs \
         SET outcome = 'failure', error_detail = 'interrupted before completion', finished_at = ?1 \
         WHERE outcome = 'running'",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Mark one run as `failure` if it is still `running`. Returns whether a
/// row changed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_stale_job_run(
    pool: &SqlitePool,
    id: i64,
    now: DateTime<Utc>,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE job_runs \
         SET outcome = 'failure', error_detail = 'interrupted before completion', finished_at = ?1 \
         WHERE id = ?2 AND outcome = 'running'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// The most recent run of `job`, in any state.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_job_run(pool: &SqlitePool, job: JobName) -> Result<Option<JobRun>, DbError> {
    let row = sqlx::query_as::<_, JobRunRow>(&format!(
        "SELECT {JOB_RUN_COLUMNS} FROM job_runs \
         WHERE job_name = ?1 \
         ORDER BY started_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(job.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(JobRun::try_from).transpose()
}

/// The most recent run of `job` that reached a final outcome.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_finished_job_run(
    pool: &SqlitePool,
    job: JobName,
) -> Result<Option<JobRun>, DbError> {
    let row = sqlx::query_as::<_, JobRunRow>(&format!(
        "SELECT {JOB_RUN_COLUMNS} FROM job_runs \
         WHERE job_name = ?1 AND outcome <> 'running' \
         ORDER BY finished_at DESC, id DESC \
         LIMIT 1"
    ))
    .bind(job.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(JobRun::try_from).transpose()
}

/// The most recent `limit` runs across all jobs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_job_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<JobRun>, DbError> {
    let rows = sqlx::query_as::<_, JobRunRow>(&format!(
        "SELECT {JOB_RUN_COLUMNS} FROM job_runs \
         ORDER BY started_at DESC, id DESC \
         LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobRun::try_from).collect()
}

/// Delete finished runs that started before `cutoff`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_finished_job_runs_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM job_runs WHERE started_at < ?1 AND outcome <> 'running'")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
