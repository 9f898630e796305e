//! Integration tests for `OpenAiSummarizer` using wiremock HTTP mocks.

use chrono::Utc;
use serde_json::{json, Value};
use trendbot_core::{Source, TrendItem};
use trendbot_summarizer::{OpenAiSummarizer, Summarizer, SummarizerError};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn items() -> Vec<TrendItem> {
    let now = Utc::now();
    vec![TrendItem {
        id: "abc".to_string(),
        source: Source::Github,
        text: "acme/rocket: a great new build tool".to_string(),
        url: "https://github.com/acme/rocket".to_string(),
        observed_at: now,
        engagement_score: 900.0,
        raw_metadata: Value::Null,
        content_hash: "h".to_string(),
        first_seen_at: now,
        updated_at: now,
    }]
}

fn summarizer(server: &MockServer) -> Summarizer {
    Summarizer::OpenAi(
        OpenAiSummarizer::new("sk-test", "gpt-4o-mini", &format!("{}/v1", server.uri()), 5)
            .expect("client construction should not fail"),
    )
}

fn chat_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
    })
}

fn moderation(flagged: bool) -> Value {
    json!({
        "id": "modr-1",
        "results": [{
            "flagged": flagged,
            "categories": { "hate": false, "violence": flagged }
        }]
    })
}

#[tokio::test]
async fn summary_and_moderation_are_combined() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-4o-mini" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            r#"{"summary": "Build tooling is hot this week.", "sentiment": 0.6}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/moderations"))
        .and(body_partial_json(json!({ "input": "Build tooling is hot this week." })))
        .respond_with(ResponseTemplate::new(200).set_body_json(moderation(false)))
        .expect(1)
        .mount(&server)
        .await;

    let summary = summarizer(&server).summarize(&items()).await.expect("summary");
    assert_eq!(summary.summary_text, "Build tooling is hot this week.");
    assert!((summary.sentiment_score - 0.6).abs() < f64::EPSILON);
    assert!(summary.moderation_passed);
    assert!(summary.flagged_categories.is_empty());
}

#[tokio::test]
async fn flagged_summary_fails_moderation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(
            r#"{"summary": "Something awful.", "sentiment": -0.9}"#,
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/moderations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(moderation(true)))
        .mount(&server)
        .await;

    let summary = summarizer(&server).summarize(&items()).await.expect("summary");
    assert!(!summary.moderation_passed);
    assert_eq!(summary.flagged_categories, vec!["violence"]);
}

#[tokio::test]
async fn missing_sentiment_falls_back_to_lexicon() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(chat_reply(r#"{"summary": "Great tools everywhere."}"#)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/moderations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(moderation(false)))
        .mount(&server)
        .await;

    let summary = summarizer(&server).summarize(&items()).await.expect("summary");
    // "great" in the item text
    assert!(summary.sentiment_score > 0.0);
}

#[tokio::test]
async fn upstream_error_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let err = summarizer(&server).summarize(&items()).await.unwrap_err();
    assert!(
        matches!(err, SummarizerError::UnexpectedStatus { status: 503, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn non_json_content_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply("just prose")))
        .mount(&server)
        .await;

    let err = summarizer(&server).summarize(&items()).await.unwrap_err();
    assert!(matches!(err, SummarizerError::Deserialize { .. }), "got {err:?}");
}
