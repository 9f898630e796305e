//! Decides whether fetched items are new relative to the store.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use trendbot_core::{NewTrendItem, ReconcileOutcome};
use trendbot_db::DbError;

/// Store-backed duplicate detection keyed by `(source, id)`.
///
/// Content equality uses the item's content fingerprint, so an edited
/// upstream item reconciles as `Updated` rather than `Unchanged`.
#[derive(Debug, Clone, Copy)]
pub struct Deduplicator<'a> {
    pool: &'a SqlitePool,
}

impl<'a> Deduplicator<'a> {
    #[must_use]
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns [`DbError`] if the lookup fails.
    pub async fn is_new(&self, item: &NewTrendItem) -> Result<bool, DbError> {
        Ok(!trendbot_db::trend_item_exists(self.pool, item.source, &item.id).await?)
    }

    /// Insert or refresh `item` in one atomic statement.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the upsert fails.
    pub async fn reconcile(
        &self,
        item: &NewTrendItem,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, DbError> {
        trendbot_db::upsert_trend_item(self.pool, item, now).await
    }
}

/// Drop repeats of the same `(source, id)` within one fetch, keeping the
/// first (highest-ranked) occurrence. Returns the kept items and the number
/// dropped.
#[must_use]
pub fn collapse_batch(items: Vec<NewTrendItem>) -> (Vec<NewTrendItem>, usize) {
    let before = items.len();
    let mut seen = HashSet::new();
    let kept: Vec<NewTrendItem> = items
        .into_iter()
        .filter(|item| seen.insert((item.source, item.id.clone())))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendbot_core::{RawItem, Source};

    fn item(text: &str, url: &str, engagement: f64) -> NewTrendItem {
        NewTrendItem::from_raw(
            Source::Reddit,
            RawItem {
                text: text.to_string(),
                url: url.to_string(),
                engagement_score: engagement,
                ..RawItem::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn batch_repeats_collapse_to_first() {
        let (kept, dropped) = collapse_batch(vec![
            item("a", "https://r/a", 10.0),
            item("b", "https://r/b", 5.0),
            item("a", "https://r/a", 1.0),
        ]);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].engagement_score - 10.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn reconcile_reports_created_then_unchanged() {
        let pool = trendbot_db::connect_in_memory().await.unwrap();
        let dedup = Deduplicator::new(&pool);
        let first = item("story", "https://r/1", 3.0);

        assert!(dedup.is_new(&first).await.unwrap());
        assert_eq!(
            dedup.reconcile(&first, Utc::now()).await.unwrap(),
            ReconcileOutcome::Created
        );
        assert!(!dedup.is_new(&first).await.unwrap());

        let refetched = item("story", "https://r/1", 30.0);
        assert_eq!(
            dedup.reconcile(&refetched, Utc::now()).await.unwrap(),
            ReconcileOutcome::Unchanged
        );
    }
}
