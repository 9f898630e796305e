//! Collection pipeline.
//!
//! Sources are swept concurrently. Each source acquires one rate-limiter
//! permit, fetches once, collapses in-batch repeats, then reconciles its
//! items one at a time so a crash mid-batch keeps the rows already written.
//! A failing source is recorded in the report and never aborts the others;
//! only a store failure ends the run early.

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use trendbot_core::{JobOutcome, NewTrendItem, ReconcileOutcome, Source};
use trendbot_db::DbError;

use crate::context::PipelineContext;
use crate::dedup::{collapse_batch, Deduplicator};
use crate::error::PipelineError;

const MAX_CONCURRENT_SOURCES: usize = Source::ALL.len();

/// Which sources to sweep and how many items to ask each for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectRequest {
    /// `None` sweeps every configured source.
    pub sources: Option<Vec<Source>>,
    /// Overrides the per-source configured limit.
    pub limit: Option<usize>,
}

/// Per-source tallies for one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub fetched: usize,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Repeats of the same item within this fetch.
    pub duplicates_in_batch: usize,
    pub rate_limited: bool,
    pub retry_after_secs: Option<u64>,
    pub error: Option<String>,
}

impl SourceReport {
    fn new(source: Source) -> Self {
        Self {
            source,
            fetched: 0,
            new: 0,
            updated: 0,
            unchanged: 0,
            duplicates_in_batch: 0,
            rate_limited: false,
            retry_after_secs: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub started_at: DateTime<Utc>,
    pub since: DateTime<Utc>,
    /// Sorted by source.
    pub sources: Vec<SourceReport>,
}

impl CollectionReport {
    /// `Failure` when every swept source errored, `PartialFailure` when some
    /// did. Rate-limited sources are back-pressure, not failures.
    #[must_use]
    pub fn outcome(&self) -> JobOutcome {
        let failed = self.sources.iter().filter(|s| s.error.is_some()).count();
        if failed == 0 {
            JobOutcome::Success
        } else if failed == self.sources.len() {
            JobOutcome::Failure
        } else {
            JobOutcome::PartialFailure
        }
    }

    #[must_use]
    pub fn source(&self, source: Source) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == source)
    }

    #[must_use]
    pub fn total_new(&self) -> usize {
        self.sources.iter().map(|s| s.new).sum()
    }

    #[must_use]
    pub fn total_updated(&self) -> usize {
        self.sources.iter().map(|s| s.updated).sum()
    }

    /// Comma-separated `source: error` pairs, `None` when nothing failed.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        let errors: Vec<String> = self
            .sources
            .iter()
            .filter_map(|s| s.error.as_ref().map(|e| format!("{}: {e}", s.source)))
            .collect();
        (!errors.is_empty()).then(|| errors.join(", "))
    }
}

/// Sweep the requested sources once.
///
/// Items are requested from `now - analysis_hours_back` onward so each
/// sweep overlaps the analysis window; reconciling makes the overlap safe.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if the store rejects a write. Source
/// failures and rate limiting are reported per source instead.
pub async fn collect(
    ctx: &PipelineContext,
    request: &CollectRequest,
    now: DateTime<Utc>,
) -> Result<CollectionReport, PipelineError> {
    let since = now - Duration::hours(i64::from(ctx.settings.analysis_hours_back));
    let requested = request
        .sources
        .clone()
        .unwrap_or_else(|| ctx.sources.sources());

    tracing::info!(sources = requested.len(), %since, "collect: starting sweep");

    let results: Vec<Result<SourceReport, DbError>> = stream::iter(requested)
        .map(|source| collect_source(ctx, source, request.limit, since, now))
        .buffer_unordered(MAX_CONCURRENT_SOURCES)
        .collect()
        .await;

    let mut sources = results.into_iter().collect::<Result<Vec<_>, DbError>>()?;
    sources.sort_by_key(|r| r.source);

    let report = CollectionReport {
        started_at: now,
        since,
        sources,
    };
    tracing::info!(
        new = report.total_new(),
        updated = report.total_updated(),
        outcome = %report.outcome(),
        "collect: sweep complete"
    );
    Ok(report)
}

async fn collect_source(
    ctx: &PipelineContext,
    source: Source,
    limit: Option<usize>,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<SourceReport, DbError> {
    let mut report = SourceReport::new(source);

    let Some(adapter) = ctx.sources.get(source) else {
        tracing::warn!(%source, "collect: no adapter configured");
        report.error = Some("source is not configured".to_string());
        return Ok(report);
    };

    match ctx.limiter.acquire(source) {
        Ok(permit) => tracing::debug!(%source, remaining = permit.remaining, "collect: permit granted"),
        Err(limited) => {
            tracing::info!(
                %source,
                retry_after_secs = limited.retry_after.as_secs(),
                "collect: rate limited; skipping source this run"
            );
            report.rate_limited = true;
            report.retry_after_secs = Some(limited.retry_after.as_secs());
            return Ok(report);
        }
    }

    let limit = limit.unwrap_or_else(|| ctx.settings.limit_for(source));
    let fetched =
        match tokio::time::timeout(ctx.settings.source_timeout, adapter.fetch(since, limit)).await {
            Ok(Ok(items)) => items,
            Ok(Err(e)) => {
                tracing::warn!(%source, error = %e, "collect: source unavailable");
                report.error = Some(e.to_string());
                return Ok(report);
            }
            Err(_) => {
                let detail = format!(
                    "fetch timed out after {}s",
                    ctx.settings.source_timeout.as_secs()
                );
                tracing::warn!(%source, "collect: {detail}");
                report.error = Some(detail);
                return Ok(report);
            }
        };

    report.fetched = fetched.len();
    let items: Vec<NewTrendItem> = fetched
        .into_iter()
        .map(|raw| NewTrendItem::from_raw(source, raw, now))
        .collect();
    let (items, dropped) = collapse_batch(items);
    report.duplicates_in_batch = dropped;

    let dedup = Deduplicator::new(&ctx.pool);
    for item in &items {
        match dedup.reconcile(item, now).await {
            Ok(ReconcileOutcome::Created) => report.new += 1,
            Ok(ReconcileOutcome::Updated) => report.updated += 1,
            Ok(ReconcileOutcome::Unchanged) => report.unchanged += 1,
            Err(e) => {
                tracing::error!(%source, error = %e, "collect: store write failed");
                return Err(e);
            }
        }
    }

    tracing::info!(
        %source,
        fetched = report.fetched,
        new = report.new,
        updated = report.updated,
        unchanged = report.unchanged,
        "collect: source complete"
    );
    Ok(report)
}
