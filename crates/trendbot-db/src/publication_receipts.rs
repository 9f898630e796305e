//! Database operations for `publication_receipts`.
//!
//! Receipts are append-only: rows are inserted and `pending` rows are
//! finalized, but nothing here deletes a receipt.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use trendbot_core::{PublicationReceipt, ReceiptStatus};

use crate::{is_unique_violation, DbError};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct ReceiptRow {
    id: i64,
    analysis_id: Option<i64>,
    published_at: DateTime<Utc>,
    publish_day: NaiveDate,
    status: String,
    external_ref: Option<String>,
    content: Option<String>,
    error_detail: Option<String>,
}

impl TryFrom<ReceiptRow> for PublicationReceipt {
    type Error = DbError;

    fn try_from(row: ReceiptRow) -> Result<Self, Self::Error> {
        Ok(PublicationReceipt {
            id: row.id,
            analysis_id: row.analysis_id,
            published_at: row.published_at,
            publish_day: row.publish_day,
            status: row.status.parse::<ReceiptStatus>()?,
            external_ref: row.external_ref,
            content: row.content,
            error_detail: row.error_detail,
        })
    }
}

const RECEIPT_COLUMNS: &str = "id, analysis_id, published_at, publish_day, status, \
                               external_ref, content, error_detail";

/// A receipt written directly in its final state.
#[derive(Debug, Clone)]
pub struct NewReceipt<'a> {
    pub analysis_id: Option<i64>,
    pub publish_day: NaiveDate,
    pub status: ReceiptStatus,
    pub content: Option<&'a str>,
    pub error_detail: Option<&'a str>,
}

/// Result of trying to claim one of the day's publish slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReservation {
    /// A `pending` receipt with this id now holds the slot.
    Reserved(i64),
    /// The day already has `limit` successful or in-flight publications.
    QuotaExhausted,
    /// The analysis already has a successful or in-flight receipt.
    AlreadyPublished,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Atomically check the daily quota and claim a slot for `analysis_id`.
///
/// The count and the insert run as one statement, so two concurrent callers
/// can never both see `limit - 1` and both publish. A claimed slot is a
/// `pending` receipt that counts against the quota until it is finalized
/// with [`finalize_receipt`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails for a reason other than
/// the one-live-receipt-per-analysis constraint.
pub async fn reserve_publish_slot(
    pool: &SqlitePool,
    analysis_id: i64,
    publish_day: NaiveDate,
    daily_limit: u32,
    content: &str,
    now: DateTime<Utc>,
) -> Result<SlotReservation, DbError> {
    let inserted = sqlx::query_scalar::<_, i64>(
        "INSERT INTO publication_receipts (analysis_id, published_at, publish_day, status, content) \
         SELECT ?1, ?2, ?3, 'pending', ?4 \
         WHERE (SELECT COUNT(*) FROM publication_receipts \
                WHERE publish_day = ?3 AND status IN ('success', 'pending')) < ?5 \
         RETURNING id",
    )
    .bind(analysis_id)
    .bind(now)
    .bind(publish_day)
    .bind(content)
    .bind(i64::from(daily_limit))
    .fetch_optional(pool)
    .await;

    match inserted {
        Ok(Some(id)) => Ok(SlotReservation::Reserved(id)),
        Ok(None) => Ok(SlotReservation::QuotaExhausted),
        Err(e) if is_unique_violation(&e) => Ok(SlotReservation::AlreadyPublished),
        Err(e) => Err(e.into()),
    }
}

/// Settle a `pending` receipt as `success` or `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidTransition`] if the receipt is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn finalize_receipt(
    pool: &SqlitePool,
    id: i64,
    status: ReceiptStatus,
    external_ref: Option<&str>,
    error_detail: Option<&str>,
    now: DateTime<Utc>,
) -> Result<PublicationReceipt, DbError> {
    let row = sqlx::query_as::<_, ReceiptRow>(&format!(
        "UPDATE publication_receipts \
         SET status = ?1, external_ref = ?2, error_detail = ?3, published_at = ?4 \
         WHERE id = ?5 AND status = 'pending' \
         RETURNING {RECEIPT_COLUMNS}"
    ))
    .bind(status.as_str())
    .bind(external_ref)
    .bind(error_detail)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::InvalidTransition {
        table: "publication_receipts",
        id,
        expected_status: "pending",
    })?;

    row.try_into()
}

/// Fail `pending` receipts reserved before `reserved_before`. Their
/// publish attempt was interrupted, so they no longer hold a quota slot
/// and their analysis becomes eligible again.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_stale_pending_receipts(
    pool: &SqlitePool,
    reserved_before: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE publication_receipts \
         SET status = 'failed', error_detail = 'interrupted before completion' \
         WHERE status = 'pending' AND published_at < ?1",
    )
    .bind(reserved_before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Insert a receipt in its final state (skips and failures that never
/// reserved a slot).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_receipt(
    pool: &SqlitePool,
    receipt: &NewReceipt<'_>,
    now: DateTime<Utc>,
) -> Result<PublicationReceipt, DbError> {
    let row = sqlx::query_as::<_, ReceiptRow>(&format!(
        "INSERT INTO publication_receipts \
             (analysis_id, published_at, publish_day, status, content, error_detail) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         RETURNING {RECEIPT_COLUMNS}"
    ))
    .bind(receipt.analysis_id)
    .bind(now)
    .bind(receipt.publish_day)
    .bind(receipt.status.as_str())
    .bind(receipt.content)
    .bind(receipt.error_detail)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Fetch one receipt by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_receipt(pool: &SqlitePool, id: i64) -> Result<PublicationReceipt, DbError> {
    let row = sqlx::query_as::<_, ReceiptRow>(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM publication_receipts WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Number of successful publications counted against `publish_day`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_successful_publications(
    pool: &SqlitePool,
    publish_day: NaiveDate,
) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM publication_receipts WHERE publish_day = ?1 AND status = 'success'",
    )
    .bind(publish_day)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// The most recent `limit` receipts, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_receipts(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<PublicationReceipt>, DbError> {
    let rows = sqlx::query_as::<_, ReceiptRow>(&format!(
        "SELECT {RECEIPT_COLUMNS} FROM publication_receipts \
         ORDER BY id DESC \
         LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(PublicationReceipt::try_from).collect()
}
