//! Database operations for `trend_items`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;
use trendbot_core::{NewTrendItem, ReconcileOutcome, Source, TrendItem};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct TrendItemRow {
    source: String,
    id: String,
    text: String,
    url: String,
    observed_at: DateTime<Utc>,
    engagement_score: f64,
    raw_metadata: Json<Value>,
    content_hash: String,
    first_seen_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TrendItemRow> for TrendItem {
    type Error = DbError;

    fn try_from(row: TrendItemRow) -> Result<Self, Self::Error> {
        Ok(TrendItem {
            source: row.source.parse::<Source>()?,
            id: row.id,
            text: row.text,
            url: row.url,
            observed_at: row.observed_at,
            engagement_score: row.engagement_score,
            raw_metadata: row.raw_metadata.0,
            content_hash: row.content_hash,
            first_seen_at: row.first_seen_at,
            updated_at: row.updated_at,
        })
    }
}

const ITEM_COLUMNS: &str = "source, id, text, url, observed_at, engagement_score, \
                            raw_metadata, content_hash, first_seen_at, updated_at";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Insert or refresh one trend item keyed by `(source, id)`.
///
/// A single statement both classifies and applies the change, so concurrent
/// reconciles of the same key can never produce a duplicate row or a lost
/// classification. Engagement and `observed_at` are refreshed on every call;
/// `first_seen_at` is only written on insert.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn upsert_trend_item(
    pool: &SqlitePool,
    item: &NewTrendItem,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, DbError> {
    let outcome: String = sqlx::query_scalar(
        "INSERT INTO trend_items \
             (source, id, text, url, observed_at, engagement_score, raw_metadata, \
              content_hash, first_seen_at, updated_at, last_reconcile) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, 'created') \
         ON CONFLICT (source, id) DO UPDATE SET \
             last_reconcile = CASE \
                 WHEN trend_items.content_hash <> excluded.content_hash THEN 'updated' \
                 ELSE 'unchanged' END, \
             text = excluded.text, \
             url = excluded.url, \
             raw_metadata = excluded.raw_metadata, \
             content_hash = excluded.content_hash, \
             observed_at = excluded.observed_at, \
             engagement_score = excluded.engagement_score, \
             updated_at = excluded.updated_at \
         RETURNING last_reconcile",
    )
    .bind(item.source.as_str())
    .bind(&item.id)
    .bind(&item.text)
    .bind(&item.url)
    .bind(item.observed_at)
    .bind(item.engagement_score)
    .bind(Json(&item.raw_metadata))
    .bind(&item.content_hash)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(outcome.parse::<ReconcileOutcome>()?)
}

/// Whether a row exists for `(source, id)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn trend_item_exists(pool: &SqlitePool, source: Source, id: &str) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM trend_items WHERE source = ?1 AND id = ?2)",
    )
    .bind(source.as_str())
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Fetch one item by key.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matches, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_trend_item(pool: &SqlitePool, source: Source, id: &str) -> Result<TrendItem, DbError> {
    let row = sqlx::query_as::<_, TrendItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM trend_items WHERE source = ?1 AND id = ?2"
    ))
    .bind(source.as_str())
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Items with `start <= observed_at < end`, highest engagement first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if a
/// stored source name is unrecognised.
pub async fn list_trend_items_in_window(
    pool: &SqlitePool,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<TrendItem>, DbError> {
    let rows = sqlx::query_as::<_, TrendItemRow>(&format!(
        "SELECT {ITEM_COLUMNS} FROM trend_items \
         WHERE observed_at >= ?1 AND observed_at < ?2 \
         ORDER BY engagement_score DESC, observed_at DESC, source, id"
    ))
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TrendItem::try_from).collect()
}

/// Total number of stored items.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_trend_items(pool: &SqlitePool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM trend_items")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Delete items observed strictly before `cutoff`. Returns rows removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_trend_items_observed_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query("DELETE FROM trend_items WHERE observed_at < ?1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
