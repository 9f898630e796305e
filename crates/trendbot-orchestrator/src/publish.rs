//! Publishing pipeline.
//!
//! Every invocation makes exactly one decision and writes exactly one
//! receipt for it. The quota check and the slot claim are a single
//! compare-and-commit in the store, so concurrent invocations cannot
//! exceed the daily limit.

use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use trendbot_core::{AnalysisResult, PublicationReceipt, ReceiptStatus};
use trendbot_db::{DbError, NewReceipt, SlotReservation};
use trendbot_publisher::{compose_thread, validate_post, ValidationError};

use crate::context::PipelineContext;
use crate::error::PipelineError;

/// Attempts to claim a slot when a concurrent run grabbed the same analysis.
const MAX_SELECTION_ATTEMPTS: usize = 3;

/// Time past the publish timeout after which a `pending` reservation is
/// treated as abandoned.
const PENDING_GRACE: Duration = Duration::from_secs(60);

/// Joins thread posts in the receipt's `content`.
const THREAD_SEPARATOR: &str = "\n\n";

/// Site-local calendar day of `now`.
#[must_use]
pub fn publish_day(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&Local).date_naive()
}

/// Fail `pending` receipts older than any live publish attempt could be,
/// releasing their quota slot and their analysis.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn release_stale_reservations(
    ctx: &PipelineContext,
    now: DateTime<Utc>,
) -> Result<u64, DbError> {
    let max_age = chrono::Duration::from_std(ctx.settings.publish_timeout + PENDING_GRACE)
        .unwrap_or_else(|_| chrono::Duration::days(1));
    let released = trendbot_db::fail_stale_pending_receipts(&ctx.pool, now - max_age).await?;
    if released > 0 {
        tracing::warn!(released, "publish: failed abandoned pending receipts");
    }
    Ok(released)
}

/// Publish the most recent eligible analysis, or record why not.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] if a receipt cannot be written. Every
/// other outcome is a receipt.
pub async fn publish_latest(
    ctx: &PipelineContext,
    now: DateTime<Utc>,
) -> Result<PublicationReceipt, PipelineError> {
    let day = publish_day(now);
    release_stale_reservations(ctx, now).await?;

    for _ in 0..MAX_SELECTION_ATTEMPTS {
        let Some(analysis) = trendbot_db::latest_publishable_analysis(&ctx.pool).await? else {
            break;
        };

        let thread = compose_thread(&analysis);
        let content = thread.join(THREAD_SEPARATOR);
        if let Err(invalid) = validate_thread(&thread) {
            tracing::warn!(analysis_id = analysis.id, error = %invalid, "publish: content rejected locally");
            let detail = invalid.to_string();
            return record(
                ctx,
                &NewReceipt {
                    analysis_id: Some(analysis.id),
                    publish_day: day,
                    status: ReceiptStatus::SkippedValidation,
                    content: Some(&content),
                    error_detail: Some(&detail),
                },
                now,
            )
            .await;
        }

        match trendbot_db::reserve_publish_slot(
            &ctx.pool,
            analysis.id,
            day,
            ctx.settings.daily_post_limit,
            &content,
            now,
        )
        .await?
        {
            SlotReservation::Reserved(receipt_id) => {
                return send(ctx, &analysis, receipt_id, &thread).await;
            }
            SlotReservation::QuotaExhausted => {
                tracing::info!(
                    analysis_id = analysis.id,
                    limit = ctx.settings.daily_post_limit,
                    %day,
                    "publish: daily quota reached"
                );
                let detail = format!("daily limit of {} reached", ctx.settings.daily_post_limit);
                return record(
                    ctx,
                    &NewReceipt {
                        analysis_id: Some(analysis.id),
                        publish_day: day,
                        status: ReceiptStatus::SkippedQuota,
                        content: Some(&content),
                        error_detail: Some(&detail),
                    },
                    now,
                )
                .await;
            }
            SlotReservation::AlreadyPublished => {
                tracing::debug!(
                    analysis_id = analysis.id,
                    "publish: analysis claimed concurrently; selecting again"
                );
            }
        }
    }

    tracing::info!("publish: no eligible analysis");
    record(
        ctx,
        &NewReceipt {
            analysis_id: None,
            publish_day: day,
            status: ReceiptStatus::SkippedValidation,
            content: None,
            error_detail: Some("no eligible analysis"),
        },
        now,
    )
    .await
}

/// Every post must pass on its own; issues are prefixed with the post's
/// position when the thread has more than one.
fn validate_thread(thread: &[String]) -> Result<(), ValidationError> {
    let multi = thread.len() > 1;
    let issues: Vec<String> = thread
        .iter()
        .enumerate()
        .filter_map(|(i, post)| validate_post(post).err().map(|e| (i, e)))
        .flat_map(|(i, e)| {
            e.issues.into_iter().map(move |issue| {
                if multi {
                    format!("post {}: {issue}", i + 1)
                } else {
                    issue
                }
            })
        })
        .collect();
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

/// Call the publish collaborator for a reserved slot and finalize the
/// receipt. The whole thread shares one receipt; its head id is the
/// external reference. No retry within this invocation.
async fn send(
    ctx: &PipelineContext,
    analysis: &AnalysisResult,
    receipt_id: i64,
    thread: &[String],
) -> Result<PublicationReceipt, PipelineError> {
    let result =
        tokio::time::timeout(ctx.settings.publish_timeout, ctx.publisher.publish_thread(thread))
            .await;
    let finished_at = Utc::now();

    let receipt = match result {
        Ok(Ok(ids)) if !ids.is_empty() => {
            let external_ref = &ids[0];
            tracing::info!(
                analysis_id = analysis.id,
                %external_ref,
                posts = ids.len(),
                "publish: published"
            );
            trendbot_db::finalize_receipt(
                &ctx.pool,
                receipt_id,
                ReceiptStatus::Success,
                Some(external_ref),
                None,
                finished_at,
            )
            .await?
        }
        Ok(Ok(_)) => {
            trendbot_db::finalize_receipt(
                &ctx.pool,
                receipt_id,
                ReceiptStatus::Failed,
                None,
                Some("publisher returned no post id"),
                finished_at,
            )
            .await?
        }
        Ok(Err(e)) => {
            tracing::warn!(analysis_id = analysis.id, error = %e, "publish: publisher failed");
            trendbot_db::finalize_receipt(
                &ctx.pool,
                receipt_id,
                ReceiptStatus::Failed,
                None,
                Some(&e.to_string()),
                finished_at,
            )
            .await?
        }
        Err(_) => {
            let detail = format!(
                "publisher timed out after {}s",
                ctx.settings.publish_timeout.as_secs()
            );
            tracing::warn!(analysis_id = analysis.id, "publish: {detail}");
            trendbot_db::finalize_receipt(
                &ctx.pool,
                receipt_id,
                ReceiptStatus::Failed,
                None,
                Some(&detail),
                finished_at,
            )
            .await?
        }
    };
    Ok(receipt)
}

async fn record(
    ctx: &PipelineContext,
    receipt: &NewReceipt<'_>,
    now: DateTime<Utc>,
) -> Result<PublicationReceipt, PipelineError> {
    Ok(trendbot_db::record_receipt(&ctx.pool, receipt, now).await?)
}
