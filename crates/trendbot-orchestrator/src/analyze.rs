//! Analysis pipeline.
//!
//! Selects the items observed in `[now - hours_back, now)`, ranks them by
//! engagement decayed by age, hands the top candidates to the summarizer,
//! and stores exactly one [`AnalysisResult`] for the window. Nothing is
//! stored when the window is empty or the summarizer fails or times out.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use trendbot_core::{AnalysisResult, NewAnalysis, TrendItem};
use trendbot_summarizer::{Summary, SummarizerError};

use crate::context::PipelineContext;
use crate::error::PipelineError;

const RECENCY_HALF_LIFE_HOURS: f64 = 12.0;
const TOP_TOPICS: usize = 5;
const MIN_TOPIC_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "your", "you", "are", "was", "but",
    "not", "have", "has", "how", "why", "what", "who", "all", "new", "now", "can", "will", "just",
    "about", "into", "out", "our", "its", "their", "they", "more", "than", "one", "get", "use",
    "using", "show", "ask", "https", "http", "www", "com",
];

/// Analyse the window ending at `now`.
///
/// # Errors
///
/// - [`PipelineError::InsufficientData`] when no item falls in the window.
/// - [`PipelineError::AnalysisUnavailable`] / [`PipelineError::AnalysisTimeout`]
///   when the summarizer fails or returns a summary that cannot form a
///   valid analysis; nothing is persisted.
/// - [`PipelineError::Store`] when the store fails.
pub async fn analyze(
    ctx: &PipelineContext,
    hours_back: u32,
    now: DateTime<Utc>,
) -> Result<AnalysisResult, PipelineError> {
    let window_end = now;
    let window_start = now - Duration::hours(i64::from(hours_back));
    let insufficient = || PipelineError::InsufficientData {
        window_start,
        window_end,
    };
    if hours_back == 0 {
        return Err(insufficient());
    }

    let items = trendbot_db::list_trend_items_in_window(&ctx.pool, window_start, window_end).await?;
    if items.is_empty() {
        tracing::info!(hours_back, "analyze: no items in window");
        return Err(insufficient());
    }

    let candidates = rank_candidates(&items, now, ctx.settings.analysis_max_items.max(1));
    tracing::info!(
        in_window = items.len(),
        candidates = candidates.len(),
        summarizer = ctx.summarizer.name(),
        "analyze: summarizing window"
    );

    let summary = match tokio::time::timeout(
        ctx.settings.summarize_timeout,
        ctx.summarizer.summarize(&candidates),
    )
    .await
    {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "analyze: summarizer unavailable");
            return Err(PipelineError::AnalysisUnavailable(e));
        }
        Err(_) => {
            tracing::warn!(
                timeout_secs = ctx.settings.summarize_timeout.as_secs(),
                "analyze: summarizer timed out"
            );
            return Err(PipelineError::AnalysisTimeout(ctx.settings.summarize_timeout));
        }
    };

    if !summary.moderation_passed {
        tracing::warn!(
            categories = ?summary.flagged_categories,
            "analyze: summary failed moderation; storing redacted result"
        );
    }

    let metadata = json!({
        "items_in_window": items.len(),
        "candidates": candidates.len(),
        "sources": source_breakdown(&items),
        "top_topics": top_topics(&candidates, TOP_TOPICS),
        "summarizer": ctx.summarizer.name(),
        "flagged_categories": summary.flagged_categories,
    });

    let analysis = build_analysis(window_start, window_end, summary, &candidates, metadata)
        .inspect_err(|e| tracing::warn!(error = %e, "analyze: summary rejected"))?;

    let stored = trendbot_db::insert_analysis(&ctx.pool, &analysis, now).await?;
    tracing::info!(
        analysis_id = stored.id,
        moderation_passed = stored.moderation_passed,
        sentiment = stored.sentiment_score,
        "analyze: analysis stored"
    );
    Ok(stored)
}

/// Assemble the row for one window, redacting text that failed
/// moderation.
///
/// # Errors
///
/// Returns [`PipelineError::AnalysisUnavailable`] if the summary breaks an
/// analysis invariant.
pub fn build_analysis(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    summary: Summary,
    candidates: &[TrendItem],
    metadata: Value,
) -> Result<NewAnalysis, PipelineError> {
    let analysis = NewAnalysis {
        window_start,
        window_end,
        summary_text: if summary.moderation_passed {
            summary.summary_text
        } else {
            String::new()
        },
        sentiment_score: summary.sentiment_score,
        source_item_ids: candidates.iter().map(|i| i.id.clone()).collect(),
        moderation_passed: summary.moderation_passed,
        metadata,
    };
    analysis.validate().map_err(|e| {
        PipelineError::AnalysisUnavailable(SummarizerError::InvalidResponse(e.to_string()))
    })?;
    Ok(analysis)
}

/// Engagement on a log scale, halved every [`RECENCY_HALF_LIFE_HOURS`].
#[must_use]
pub fn significance(item: &TrendItem, now: DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let age_hours = (now - item.observed_at).num_seconds().max(0) as f64 / 3600.0;
    item.engagement_score.max(0.0).ln_1p() * 0.5_f64.powf(age_hours / RECENCY_HALF_LIFE_HOURS)
}

/// The `max` most significant items, most significant first.
#[must_use]
pub fn rank_candidates(items: &[TrendItem], now: DateTime<Utc>, max: usize) -> Vec<TrendItem> {
    let mut scored: Vec<(f64, &TrendItem)> =
        items.iter().map(|item| (significance(item, now), item)).collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
    scored.into_iter().take(max).map(|(_, item)| item.clone()).collect()
}

fn source_breakdown(items: &[TrendItem]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for item in items {
        *counts.entry(item.source.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Most frequent words across `items`, each item counted once per word.
/// GitHub repository topics are counted alongside title words.
#[must_use]
pub fn top_topics(items: &[TrendItem], max: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for item in items {
        let mut words: HashSet<String> = item
            .text
            .split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .filter(|w| {
                w.chars().count() >= MIN_TOPIC_LEN
                    && !w.chars().all(|c| c.is_ascii_digit())
                    && !STOPWORDS.contains(&w.as_str())
            })
            .collect();

        if let Some(Value::Array(topics)) = item.raw_metadata.get("topics") {
            words.extend(
                topics
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_lowercase),
            );
        }

        for word in words {
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(max).map(|(word, _)| word).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use trendbot_core::Source;

    fn item(id: &str, text: &str, engagement: f64, age_hours: i64, now: DateTime<Utc>) -> TrendItem {
        TrendItem {
            id: id.to_string(),
            source: Source::Hackernews,
            text: text.to_string(),
            url: String::new(),
            observed_at: now - Duration::hours(age_hours),
            engagement_score: engagement,
            raw_metadata: Value::Null,
            content_hash: String::new(),
            first_seen_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn significance_halves_every_half_life() {
        let now = Utc::now();
        let fresh = significance(&item("a", "", 100.0, 0, now), now);
        let older = significance(&item("a", "", 100.0, 12, now), now);
        assert!((older - fresh / 2.0).abs() < 1e-9);
    }

    #[test]
    fn ranking_prefers_recent_engagement() {
        let now = Utc::now();
        let items = vec![
            item("stale", "", 1000.0, 48, now),
            item("fresh", "", 500.0, 1, now),
            item("quiet", "", 0.0, 0, now),
        ];
        let ranked = rank_candidates(&items, now, 2);
        let ids: Vec<_> = ranked.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["fresh", "stale"]);
    }

    fn summary(sentiment_score: f64, moderation_passed: bool) -> Summary {
        Summary {
            summary_text: "Rust tooling keeps improving.".to_string(),
            sentiment_score,
            moderation_passed,
            flagged_categories: Vec::new(),
        }
    }

    #[test]
    fn out_of_range_sentiment_is_rejected_before_storage() {
        let now = Utc::now();
        let candidates = vec![item("a", "Rust tooling", 10.0, 1, now)];
        let err = build_analysis(
            now - Duration::hours(24),
            now,
            summary(1.5, true),
            &candidates,
            json!({}),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::AnalysisUnavailable(SummarizerError::InvalidResponse(ref why))
                if why.contains("sentiment")
        ));

        let err = build_analysis(now - Duration::hours(1), now, summary(0.1, true), &[], json!({}))
            .unwrap_err();
        assert!(matches!(err, PipelineError::AnalysisUnavailable(_)));
    }

    #[test]
    fn failed_moderation_redacts_summary_text() {
        let now = Utc::now();
        let candidates = vec![item("a", "Rust tooling", 10.0, 1, now)];
        let analysis = build_analysis(
            now - Duration::hours(24),
            now,
            summary(-0.4, false),
            &candidates,
            json!({}),
        )
        .unwrap();
        assert!(analysis.summary_text.is_empty());
        assert!(!analysis.moderation_passed);
        assert_eq!(analysis.source_item_ids, vec!["a"]);
    }

    #[test]
    fn topics_skip_stopwords_and_count_once_per_item() {
        let now = Utc::now();
        let mut repo = item("r", "rust rust rust", 1.0, 0, now);
        repo.raw_metadata = json!({ "topics": ["WebAssembly"] });
        let items = vec![
            repo,
            item("a", "The Rust compiler and WebAssembly", 1.0, 0, now),
            item("b", "Why the compiler is slow in 2026", 1.0, 0, now),
        ];
        let topics = top_topics(&items, 3);
        assert_eq!(topics, vec!["compiler", "rust", "webassembly"]);
    }
}
