//! Database operations for `analysis_results`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;
use trendbot_core::{AnalysisResult, NewAnalysis};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
struct AnalysisRow {
    id: i64,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    summary_text: String,
    sentiment_score: f64,
    source_item_ids: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    moderation_passed: bool,
    metadata: Json<Value>,
}

impl From<AnalysisRow> for AnalysisResult {
    fn from(row: AnalysisRow) -> Self {
        AnalysisResult {
            id: row.id,
            window_start: row.window_start,
            window_end: row.window_end,
            summary_text: row.summary_text,
            sentiment_score: row.sentiment_score,
            source_item_ids: row.source_item_ids.0,
            created_at: row.created_at,
            moderation_passed: row.moderation_passed,
            metadata: row.metadata.0,
        }
    }
}

const ANALYSIS_COLUMNS: &str = "id, window_start, window_end, summary_text, sentiment_score, \
                                source_item_ids, created_at, moderation_passed, metadata";

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Store a new analysis result. Analyses are never updated afterwards.
///
/// # Errors
///
/// Returns [`DbError::Decode`] if the analysis fails validation, or
/// [`DbError::Sqlx`] if the insert fails.
pub async fn insert_analysis(
    pool: &SqlitePool,
    analysis: &NewAnalysis,
    created_at: DateTime<Utc>,
) -> Result<AnalysisResult, DbError> {
    analysis.validate()?;

    let row = sqlx::query_as::<_, AnalysisRow>(&format!(
        "INSERT INTO analysis_results \
             (window_start, window_end, summary_text, sentiment_score, source_item_ids, \
              created_at, moderation_passed, metadata) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         RETURNING {ANALYSIS_COLUMNS}"
    ))
    .bind(analysis.window_start)
    .bind(analysis.window_end)
    .bind(&analysis.summary_text)
    .bind(analysis.sentiment_score)
    .bind(Json(&analysis.source_item_ids))
    .bind(created_at)
    .bind(analysis.moderation_passed)
    .bind(Json(&analysis.metadata))
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Fetch one analysis by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_analysis(pool: &SqlitePool, id: i64) -> Result<AnalysisResult, DbError> {
    let row = sqlx::query_as::<_, AnalysisRow>(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM analysis_results WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row.into())
}

/// The newest analysis that may be published next.
///
/// Eligible means moderation passed, and no receipt marks it as published,
/// in flight, or rejected by content validation. Analyses whose earlier
/// attempts failed or hit the quota stay eligible.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_publishable_analysis(
    pool: &SqlitePool,
) -> Result<Option<AnalysisResult>, DbError> {
    let row = sqlx::query_as::<_, AnalysisRow>(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM analysis_results a \
         WHERE a.moderation_passed = 1 \
           AND NOT EXISTS ( \
               SELECT 1 FROM publication_receipts r \
               WHERE r.analysis_id = a.id \
                 AND r.status IN ('success', 'pending', 'skipped_validation')) \
         ORDER BY a.created_at DESC, a.id DESC \
         LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(AnalysisResult::from))
}

/// The most recent `limit` analyses, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_recent_analyses(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<AnalysisResult>, DbError> {
    let rows = sqlx::query_as::<_, AnalysisRow>(&format!(
        "SELECT {ANALYSIS_COLUMNS} FROM analysis_results \
         ORDER BY created_at DESC, id DESC \
         LIMIT ?1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(AnalysisResult::from).collect())
}

/// Total number of stored analyses.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn count_analyses(pool: &SqlitePool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM analysis_results")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Delete analyses created before `cutoff` that no receipt references.
///
/// Referenced analyses are kept so receipts always resolve.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_unreferenced_analyses_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM analysis_results \
         WHERE created_at < ?1 \
           AND NOT EXISTS ( \
               SELECT 1 FROM publication_receipts r WHERE r.analysis_id = analysis_results.id)",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
