//! Post composition and pre-publish content checks.

use std::sync::LazyLock;

use regex::Regex;
use trendbot_core::AnalysisResult;

use crate::error::ValidationError;

pub const MAX_POST_CHARS: usize = 280;
pub const MAX_HASHTAGS: usize = 5;
pub const BOT_TAG: &str = "🤖";
pub const MAX_THREAD_POSTS: usize = 3;

const BOT_IDENTIFIERS: &[&str] = &["🤖", "#bot", "[bot]", "automated"];
const BASE_HASHTAG: &str = "#TechTrends";
const TOPIC_HASHTAGS: usize = 2;
const MAX_CAPS_RATIO: f64 = 0.3;
const MAX_CHAR_RUN: usize = 4;
/// Room for a " (i/n)" position marker.
const MARKER_CHARS: usize = 6;

static PROMOTIONAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(buy|sell|invest|money|crypto|bitcoin)\b.*\b(now|today|urgent)\b",
        r"(?i)\b(click|link|dm|message)\b.*\b(below|here|bio)\b",
        r"(?i)\b(free|prize|winner|giveaway)\b.*\b(claim|click|enter)\b",
    ]
    .into_iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

/// Render `analysis` as a single post of at most [`MAX_POST_CHARS`]
/// characters, always ending with hashtags and the bot marker.
#[must_use]
pub fn compose_post(analysis: &AnalysisResult) -> String {
    let (prefix, suffix) = head_frame(analysis);
    let head = format!("{prefix}{}", analysis.summary_text.trim());
    let budget = MAX_POST_CHARS.saturating_sub(suffix.chars().count());

    format!("{}{suffix}", truncate_chars(&head, budget))
}

/// Render `analysis` as a thread of at most [`MAX_THREAD_POSTS`] posts.
///
/// A summary that fits one post yields exactly [`compose_post`]. Longer
/// summaries are split on word boundaries: the head keeps the window and
/// hashtags, every post is numbered and carries the bot marker, and text
/// past the last post is truncated.
#[must_use]
pub fn compose_thread(analysis: &AnalysisResult) -> Vec<String> {
    let (prefix, suffix) = head_frame(analysis);
    let summary = analysis.summary_text.trim();
    let frame = prefix.chars().count() + suffix.chars().count();
    if frame + summary.chars().count() <= MAX_POST_CHARS {
        return vec![compose_post(analysis)];
    }

    let head_budget = MAX_POST_CHARS.saturating_sub(frame + MARKER_CHARS);
    let reply_budget = MAX_POST_CHARS.saturating_sub(MARKER_CHARS + 1 + BOT_TAG.chars().count());
    let budget = |part: usize| if part == 0 { head_budget } else { reply_budget };

    let mut parts: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in summary.split_whitespace() {
        let len = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if len <= budget(parts.len()) {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            continue;
        }
        if parts.len() + 1 == MAX_THREAD_POSTS {
            current = truncate_chars(&format!("{current} {word}"), budget(parts.len()));
            break;
        }
        if !current.is_empty() {
            parts.push(truncate_chars(&current, budget(parts.len())));
        }
        current = word.to_string();
    }
    if !current.is_empty() {
        parts.push(truncate_chars(&current, budget(parts.len())));
    }

    if parts.len() <= 1 {
        return vec![compose_post(analysis)];
    }
    let total = parts.len();
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let marker = format!("({}/{total})", i + 1);
            if i == 0 {
                format!("{prefix}{part} {marker}{suffix}")
            } else {
                format!("{part} {marker} {BOT_TAG}")
            }
        })
        .collect()
}

/// Opening text and closing hashtags plus bot marker for the head post.
fn head_frame(analysis: &AnalysisResult) -> (String, String) {
    let hours = (analysis.window_end - analysis.window_start).num_hours().max(1);

    let mut tags = vec![BASE_HASHTAG.to_string()];
    tags.extend(topic_hashtags(analysis).into_iter().take(TOPIC_HASHTAGS));

    (
        format!("📊 Tech trends ({hours}h): "),
        format!(" {} {BOT_TAG}", tags.join(" ")),
    )
}

/// Check `content` against platform automation rules.
///
/// # Errors
///
/// Returns [`ValidationError`] listing every rule the content breaks.
pub fn validate_post(content: &str) -> Result<(), ValidationError> {
    let mut issues = Vec::new();
    let chars = content.chars().count();

    if content.trim().is_empty() {
        issues.push("empty content".to_string());
    }
    if chars > MAX_POST_CHARS {
        issues.push(format!("too long: {chars} characters (max {MAX_POST_CHARS})"));
    }

    let lower = content.to_lowercase();
    if !BOT_IDENTIFIERS.iter().any(|id| lower.contains(id)) {
        issues.push("missing bot identification".to_string());
    }

    let hashtags = content.matches('#').count();
    if hashtags > MAX_HASHTAGS {
        issues.push(format!("too many hashtags: {hashtags} (max {MAX_HASHTAGS})"));
    }

    if longest_char_run(content) > MAX_CHAR_RUN {
        issues.push("repeated characters".to_string());
    }

    if chars > 0 {
        let upper = content.chars().filter(|c| c.is_uppercase()).count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = upper as f64 / chars as f64;
        if ratio > MAX_CAPS_RATIO {
            issues.push("excessive capitalization".to_string());
        }
    }

    if PROMOTIONAL_PATTERNS.iter().any(|re| re.is_match(content)) {
        issues.push("promotional or spam pattern".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

fn topic_hashtags(analysis: &AnalysisResult) -> Vec<String> {
    analysis
        .metadata
        .get("top_topics")
        .and_then(serde_json::Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(serde_json::Value::as_str)
                .filter(|t| t.len() >= 3 && t.chars().all(char::is_alphanumeric))
                .map(|t| {
                    let mut chars = t.chars();
                    let first = chars.next().map(|c| c.to_uppercase().to_string()).unwrap_or_default();
                    format!("#{first}{}", chars.as_str().to_lowercase())
                })
                .collect()
        })
        .unwrap_or_default()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let truncated: String = text.chars().take(keep).collect();
    format!("{}...", truncated.trim_end())
}

fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut prev = None;
    for c in text.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        longest = longest.max(run);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn analysis(summary: &str, topics: serde_json::Value) -> AnalysisResult {
        let end = Utc::now();
        AnalysisResult {
            id: 1,
            window_start: end - Duration::hours(24),
            window_end: end,
            summary_text: summary.to_string(),
            sentiment_score: 0.2,
            source_item_ids: vec!["a".to_string()],
            created_at: end,
            moderation_passed: true,
            metadata: json!({ "top_topics": topics }),
        }
    }

    #[test]
    fn composed_post_is_valid_and_tagged() {
        let post = compose_post(&analysis(
            "Rust tooling and local models dominate the conversation.",
            json!(["rust", "llm", "c++"]),
        ));
        assert!(post.starts_with("📊 Tech trends (24h): Rust tooling"));
        assert!(post.ends_with("#TechTrends #Rust #Llm 🤖"), "got {post}");
        assert!(validate_post(&post).is_ok(), "{:?}", validate_post(&post));
    }

    #[test]
    fn long_summary_is_truncated_to_fit() {
        let post = compose_post(&analysis(&"word ".repeat(100), json!([])));
        assert!(post.chars().count() <= MAX_POST_CHARS);
        assert!(post.contains("..."));
        assert!(post.ends_with(BOT_TAG));
    }

    #[test]
    fn short_summary_is_a_single_post_thread() {
        let a = analysis("Zig and Rust trade blows on build speed.", json!(["zig"]));
        assert_eq!(compose_thread(&a), vec![compose_post(&a)]);
    }

    #[test]
    fn long_summary_becomes_numbered_thread() {
        let summary = "Async runtimes converge on structured concurrency while compile times drop. "
            .repeat(6);
        let thread = compose_thread(&analysis(&summary, json!(["rust", "tokio"])));

        assert!(thread.len() > 1 && thread.len() <= MAX_THREAD_POSTS, "{thread:#?}");
        let total = thread.len();
        for (i, post) in thread.iter().enumerate() {
            assert!(post.chars().count() <= MAX_POST_CHARS, "post {i}: {post}");
            assert!(post.contains(&format!("({}/{total})", i + 1)), "post {i}: {post}");
            assert!(validate_post(post).is_ok(), "post {i}: {:?}", validate_post(post));
        }
        assert!(thread[0].starts_with("📊 Tech trends (24h): Async runtimes"));
        assert!(thread[0].ends_with("#TechTrends #Rust #Tokio 🤖"));
        assert!(thread[1..].iter().all(|p| !p.contains('#') && p.ends_with(BOT_TAG)));

        // Nothing is dropped when the summary fits the thread.
        assert_eq!(thread.concat().matches("concurrency").count(), 6);
    }

    #[test]
    fn oversized_summary_is_cut_at_the_last_post() {
        let thread = compose_thread(&analysis(&"crate ".repeat(400), json!([])));
        assert_eq!(thread.len(), MAX_THREAD_POSTS);
        assert!(thread.last().unwrap().contains("..."));
        assert!(thread.iter().all(|p| p.chars().count() <= MAX_POST_CHARS));
    }

    #[test]
    fn empty_content_fails() {
        let err = validate_post("   ").unwrap_err();
        assert!(err.issues.iter().any(|i| i.contains("empty")));
    }

    #[test]
    fn missing_bot_marker_fails() {
        let err = validate_post("Plain update about Rust").unwrap_err();
        assert_eq!(err.issues, vec!["missing bot identification"]);
    }

    #[test]
    fn too_many_hashtags_fail() {
        let err = validate_post("#a #b #c #d #e #f 🤖").unwrap_err();
        assert!(err.issues.iter().any(|i| i.starts_with("too many hashtags")));
    }

    #[test]
    fn shouting_and_spam_fail() {
        assert!(validate_post("HUGE NEWS TODAY 🤖").is_err());
        assert!(validate_post("buy bitcoin now 🤖").is_err());
        assert!(validate_post("sooooo good 🤖").is_err());
    }

    #[test]
    fn overlong_content_fails() {
        let text = format!("{} 🤖", "a b ".repeat(80));
        let err = validate_post(&text).unwrap_err();
        assert!(err.issues.iter().any(|i| i.starts_with("too long")));
    }
}
