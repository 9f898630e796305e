use chrono::{DateTime, Duration, Utc};
use trendbot_db::PurgeCounts;

use crate::context::PipelineContext;
use crate::error::PipelineError;

/// Purge data older than `retention_days` before `now`. Receipts are kept.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if a delete fails.
pub async fn cleanup(
    ctx: &PipelineContext,
    retention_days: u32,
    now: DateTime<Utc>,
) -> Result<PurgeCounts, PipelineError> {
    let max_age = Duration::days(i64::from(retention_days));
    let counts = trendbot_db::purge_older_than(&ctx.pool, max_age, now).await?;
    tracing::info!(
        cutoff = %(now - max_age),
        trend_items = counts.trend_items,
        analyses = counts.analyses,
        job_runs = counts.job_runs,
        "cleanup: purge complete"
    );
    Ok(counts)
}
