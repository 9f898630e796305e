//! Retention sweep across all tables.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    delete_finished_job_runs_before, delete_trend_items_observed_before,
    delete_unreferenced_analyses_before, DbError,
};

/// Rows removed by one [`purge_older_than`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCounts {
    pub trend_items: u64,
    pub analyses: u64,
    pub job_runs: u64,
}

/// Remove data older than `max_age` as of `now`, i.e. strictly before
/// `now - max_age`.
///
/// Publication receipts are never removed, and analyses referenced by a
/// receipt are kept with them.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any delete fails. Earlier deletes are not
/// rolled back; a later sweep picks up where this one stopped.
pub async fn purge_older_than(
    pool: &SqlitePool,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<PurgeCounts, DbError> {
    let cutoff = now - max_age;
    let trend_items = delete_trend_items_observed_before(pool, cutoff).await?;
    let analyses = delete_unreferenced_analyses_before(pool, cutoff).await?;
    let job_runs = delete_finished_job_runs_before(pool, cutoff).await?;

    Ok(PurgeCounts {
        trend_items,
        analyses,
        job_runs,
    })
}
