//! Read-only markdown report over the store.

use std::fmt::Write as _;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use trendbot_core::{AnalysisResult, TrendItem};
use trendbot_db::DbError;

const REPORT_ITEMS: usize = 15;

/// The latest analysis and the items behind it.
///
/// Without any analysis, `items` holds the most engaging items of the last
/// `hours_back` hours instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub generated_at: DateTime<Utc>,
    pub analysis: Option<AnalysisResult>,
    pub items: Vec<TrendItem>,
}

/// # Errors
///
/// Returns [`DbError`] if a query fails.
pub async fn build_report(
    pool: &SqlitePool,
    hours_back: u32,
    now: DateTime<Utc>,
) -> Result<TrendReport, DbError> {
    let analysis = trendbot_db::list_recent_analyses(pool, 1).await?.into_iter().next();

    let items = match &analysis {
        Some(a) => {
            let window =
                trendbot_db::list_trend_items_in_window(pool, a.window_start, a.window_end).await?;
            window
                .into_iter()
                .filter(|item| a.source_item_ids.contains(&item.id))
                .collect()
        }
        None => {
            let start = now - Duration::hours(i64::from(hours_back));
            trendbot_db::list_trend_items_in_window(pool, start, now).await?
        }
    };

    Ok(TrendReport {
        generated_at: now,
        analysis,
        items,
    })
}

impl TrendReport {
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Tech trend report\n\n");
        let _ = writeln!(out, "Generated {}\n", self.generated_at.format("%Y-%m-%d %H:%M UTC"));

        match &self.analysis {
            Some(a) => {
                let _ = writeln!(
                    out,
                    "## Analysis #{} ({} to {})\n",
                    a.id,
                    a.window_start.format("%Y-%m-%d %H:%M"),
                    a.window_end.format("%Y-%m-%d %H:%M")
                );
                if a.moderation_passed {
                    let _ = writeln!(out, "{}\n", a.summary_text);
                } else {
                    out.push_str("_Summary withheld: failed moderation._\n\n");
                }
                let _ = writeln!(out, "- Sentiment: {:+.2}", a.sentiment_score);
                if let Some(sources) = a.metadata.get("sources").and_then(|s| s.as_object()) {
                    let breakdown: Vec<String> =
                        sources.iter().map(|(k, v)| format!("{k} {v}")).collect();
                    let _ = writeln!(out, "- Sources: {}", breakdown.join(", "));
                }
                if let Some(topics) = a.metadata.get("top_topics").and_then(|t| t.as_array()) {
                    let topics: Vec<&str> = topics.iter().filter_map(|t| t.as_str()).collect();
                    let _ = writeln!(out, "- Top topics: {}", topics.join(", "));
                }
                out.push('\n');
            }
            None => out.push_str("_No analysis has been run yet._\n\n"),
        }

        out.push_str("## Top items\n\n");
        if self.items.is_empty() {
            out.push_str("_No items._\n");
        }
        for (rank, item) in self.items.iter().take(REPORT_ITEMS).enumerate() {
            let _ = writeln!(
                out,
                "{}. [{}] [{}]({}) ({:.0})",
                rank + 1,
                item.source,
                item.text.replace(['[', ']'], ""),
                item.url,
                item.engagement_score
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use trendbot_core::Source;

    #[test]
    fn markdown_lists_summary_and_items() {
        let now = Utc::now();
        let report = TrendReport {
            generated_at: now,
            analysis: Some(AnalysisResult {
                id: 7,
                window_start: now - Duration::hours(24),
                window_end: now,
                summary_text: "Rust everywhere.".to_string(),
                sentiment_score: 0.25,
                source_item_ids: vec!["a".to_string()],
                created_at: now,
                moderation_passed: true,
                metadata: json!({ "sources": { "github": 1 }, "top_topics": ["rust"] }),
            }),
            items: vec![TrendItem {
                id: "a".to_string(),
                source: Source::Github,
                text: "acme/[rocket]".to_string(),
                url: "https://github.com/acme/rocket".to_string(),
                observed_at: now,
                engagement_score: 900.0,
                raw_metadata: Value::Null,
                content_hash: String::new(),
                first_seen_at: now,
                updated_at: now,
            }],
        };

        let md = report.to_markdown();
        assert!(md.contains("## Analysis #7"));
        assert!(md.contains("Rust everywhere."));
        assert!(md.contains("- Sentiment: +0.25"));
        assert!(md.contains("- Sources: github 1"));
        assert!(md.contains("1. [github] [acme/rocket](https://github.com/acme/rocket) (900)"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = TrendReport {
            generated_at: Utc::now(),
            analysis: None,
            items: Vec::new(),
        };
        let md = report.to_markdown();
        assert!(md.contains("No analysis has been run yet"));
        assert!(md.contains("_No items._"));
    }
}
