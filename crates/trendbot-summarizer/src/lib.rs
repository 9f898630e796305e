//! Summarization collaborator for the analysis pipeline.
//!
//! Turns a ranked set of trend items into summary text, a sentiment score,
//! and a moderation verdict. An OpenAI-compatible model is used when an API
//! key is configured; otherwise an offline extractive summarizer built on the
//! lexicon scorer stands in.

pub mod error;
pub mod openai;
pub mod scorer;

use serde::Serialize;
use trendbot_core::{SummarizerSettings, TrendItem};

pub use error::SummarizerError;
pub use openai::OpenAiSummarizer;
pub use scorer::{lexicon_score, mean_lexicon_score};

const EXTRACTIVE_HEADLINES: usize = 5;
const EXTRACTIVE_HEADLINE_CHARS: usize = 90;

/// Terms the offline summarizer refuses to pass through.
const BLOCKED_TERMS: &[&str] = &["nsfw", "porn", "gore", "nude", "nudes"];

/// What the collaborator returns for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub summary_text: String,
    /// In `[-1.0, 1.0]`.
    pub sentiment_score: f64,
    pub moderation_passed: bool,
    /// Moderation categories that tripped, empty when passed.
    pub flagged_categories: Vec<String>,
}

/// Closed set of summarization backends.
#[derive(Debug, Clone)]
pub enum Summarizer {
    OpenAi(OpenAiSummarizer),
    Extractive,
}

impl Summarizer {
    /// Pick the backend for `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError`] if the model client cannot be constructed.
    pub fn from_settings(settings: &SummarizerSettings) -> Result<Self, SummarizerError> {
        match OpenAiSummarizer::from_settings(settings)? {
            Some(client) => Ok(Summarizer::OpenAi(client)),
            None => {
                tracing::info!("OPENAI_API_KEY not set; using extractive summarizer");
                Ok(Summarizer::Extractive)
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Summarizer::OpenAi(_) => "openai",
            Summarizer::Extractive => "extractive",
        }
    }

    /// Summarize `items` (already ranked, most significant first).
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError`] when the backend is unreachable or answers
    /// with something unusable. The extractive backend never fails.
    pub async fn summarize(&self, items: &[TrendItem]) -> Result<Summary, SummarizerError> {
        match self {
            Summarizer::OpenAi(client) => client.summarize(items).await,
            Summarizer::Extractive => Ok(extractive_summary(items)),
        }
    }
}

fn extractive_summary(items: &[TrendItem]) -> Summary {
    let headlines: Vec<String> = items
        .iter()
        .take(EXTRACTIVE_HEADLINES)
        .map(|item| {
            let text: String = item.text.chars().take(EXTRACTIVE_HEADLINE_CHARS).collect();
            format!("{text} ({})", item.source)
        })
        .collect();

    let summary_text = if headlines.is_empty() {
        String::new()
    } else {
        format!("Trending now: {}", headlines.join("; "))
    };

    let flagged_categories: Vec<String> = BLOCKED_TERMS
        .iter()
        .filter(|term| {
            summary_text
                .split(|c: char| !c.is_alphanumeric())
                .any(|w| w.eq_ignore_ascii_case(term))
        })
        .map(|term| (*term).to_string())
        .collect();

    Summary {
        sentiment_score: mean_lexicon_score(items.iter().map(|i| i.text.as_str())),
        moderation_passed: flagged_categories.is_empty(),
        flagged_categories,
        summary_text,
    }
}
