//! OpenAI-compatible chat completion and moderation client.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use trendbot_core::{SummarizerSettings, TrendItem};

use crate::error::SummarizerError;
use crate::scorer::mean_lexicon_score;
use crate::Summary;

const SYSTEM_PROMPT: &str = "You analyse technology trends collected from social and developer \
platforms. Reply with a JSON object with exactly two keys: \"summary\", a concise overview of \
the main themes in at most 600 characters, and \"sentiment\", a number from -1 (very negative) \
to 1 (very positive) describing the overall tone.";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    response_format: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelSummary {
    summary: String,
    sentiment: Option<f64>,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: serde_json::Map<String, serde_json::Value>,
}

/// Client for an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiSummarizer {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSummarizer")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiSummarizer {
    /// # Errors
    ///
    /// Returns [`SummarizerError::Http`] if the HTTP client cannot be built,
    /// or [`SummarizerError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn new(
        api_key: &str,
        model: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalised).map_err(|_| SummarizerError::InvalidBaseUrl(base_url.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        })
    }

    /// Build from settings; `None` when no API key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SummarizerError`] if the client cannot be constructed.
    pub fn from_settings(settings: &SummarizerSettings) -> Result<Option<Self>, SummarizerError> {
        settings
            .api_key
            .as_deref()
            .map(|key| {
                Self::new(
                    key,
                    &settings.model,
                    &settings.base_url,
                    settings.timeout_secs,
                )
            })
            .transpose()
    }

    /// Summarize `items`, then moderate the summary.
    pub(crate) async fn summarize(&self, items: &[TrendItem]) -> Result<Summary, SummarizerError> {
        let prompt = build_prompt(items);
        let model_summary = self.complete(&prompt).await?;

        let summary_text = model_summary.summary.trim().to_string();
        if summary_text.is_empty() {
            return Err(SummarizerError::InvalidResponse(
                "model returned an empty summary".to_string(),
            ));
        }

        let sentiment_score = match model_summary.sentiment {
            Some(s) if s.is_finite() => s.clamp(-1.0, 1.0),
            _ => {
                tracing::debug!("model omitted sentiment; using lexicon score");
                mean_lexicon_score(items.iter().map(|i| i.text.as_str()))
            }
        };

        let (moderation_passed, flagged_categories) = self.moderate(&summary_text).await?;

        Ok(Summary {
            summary_text,
            sentiment_score,
            moderation_passed,
            flagged_categories,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<ModelSummary, SummarizerError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
            response_format: json!({ "type": "json_object" }),
        };

        let response: ChatResponse = self.post_json("chat/completions", &request).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SummarizerError::InvalidResponse("no choices returned".to_string()))?;

        serde_json::from_str(&content).map_err(|e| SummarizerError::Deserialize {
            context: "chat completion content".to_string(),
            source: e,
        })
    }

    /// Returns `(passed, flagged categories)`.
    async fn moderate(&self, text: &str) -> Result<(bool, Vec<String>), SummarizerError> {
        let response: ModerationResponse = self
            .post_json("moderations", &json!({ "input": text }))
            .await?;

        let Some(result) = response.results.into_iter().next() else {
            return Err(SummarizerError::InvalidResponse(
                "moderation returned no results".to_string(),
            ));
        };

        let categories = result
            .categories
            .into_iter()
            .filter(|(_, v)| v.as_bool() == Some(true))
            .map(|(k, _)| k)
            .collect();

        Ok((!result.flagged, categories))
    }

    async fn post_json<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
        body: &B,
    ) -> Result<T, SummarizerError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|_| SummarizerError::InvalidBaseUrl(self.base_url.to_string()))?;

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SummarizerError::UnexpectedStatus {
                endpoint,
                status: status.as_u16(),
                body: text.chars().take(300).collect(),
            });
        }

        serde_json::from_str(&text).map_err(|e| SummarizerError::Deserialize {
            context: endpoint.to_string(),
            source: e,
        })
    }
}

fn build_prompt(items: &[TrendItem]) -> String {
    let mut prompt = format!(
        "Summarize the following {} trending items and rate their overall sentiment.\n\n",
        items.len()
    );
    for item in items {
        prompt.push_str(&format!(
            "- [{}] {} (engagement {:.0})\n",
            item.source, item.text, item.engagement_score
        ));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_keeps_version_path() {
        let client = OpenAiSummarizer::new("k", "m", "https://api.openai.com/v1", 5).unwrap();
        assert_eq!(
            client.base_url.join("chat/completions").unwrap().as_str(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn from_settings_without_key_is_none() {
        let settings = SummarizerSettings {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        };
        assert!(OpenAiSummarizer::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let client = OpenAiSummarizer::new("sk-secret", "m", "https://api.openai.com/v1", 5).unwrap();
        assert!(!format!("{client:?}").contains("sk-secret"));
    }
}
