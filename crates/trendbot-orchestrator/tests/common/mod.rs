#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use trendbot_core::{AnalysisResult, NewAnalysis, NewTrendItem, RawItem, Source};
use trendbot_orchestrator::{PipelineContext, PipelineSettings, ScheduleSettings, TrendBot};
use trendbot_publisher::{Publisher, TwitterPublisher};
use trendbot_sources::{GithubAdapter, HttpSettings, RateLimiter, SourceSet, TwitterAdapter};
use trendbot_summarizer::Summarizer;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn http() -> HttpSettings {
    HttpSettings {
        user_agent: "trendbot-tests".to_string(),
        timeout_secs: 5,
    }
}

pub fn github(server: &MockServer) -> GithubAdapter {
    GithubAdapter::with_base_url(&http(), None, &server.uri()).unwrap()
}

pub fn twitter(server: &MockServer) -> TwitterAdapter {
    TwitterAdapter::with_base_url(
        &http(),
        "test-bearer".to_string(),
        "#rustlang".to_string(),
        &server.uri(),
    )
    .unwrap()
}

pub fn twitter_publisher(server: &MockServer) -> Publisher {
    Publisher::Twitter(TwitterPublisher::with_base_url("test-access", &server.uri(), 5).unwrap())
}

pub fn test_settings() -> PipelineSettings {
    PipelineSettings {
        source_timeout: Duration::from_secs(5),
        summarize_timeout: Duration::from_secs(5),
        publish_timeout: Duration::from_secs(5),
        ..PipelineSettings::default()
    }
}

pub async fn context(sources: SourceSet, publisher: Publisher) -> PipelineContext {
    PipelineContext {
        pool: trendbot_db::connect_in_memory().await.unwrap(),
        sources,
        limiter: RateLimiter::new(),
        summarizer: Summarizer::Extractive,
        publisher,
        settings: test_settings(),
    }
}

/// Timers far enough apart that nothing fires during a test.
pub fn quiet_schedule() -> ScheduleSettings {
    ScheduleSettings {
        collection_every: Duration::from_secs(24 * 3600),
        analysis_every: Duration::from_secs(24 * 3600),
        cleanup_every: Duration::from_secs(24 * 3600),
        publish_times: vec![chrono::NaiveTime::from_hms_opt(4, 30, 0).unwrap()],
    }
}

pub fn bot(ctx: PipelineContext) -> TrendBot {
    TrendBot::new(ctx, quiet_schedule())
}

pub fn repos_body(repos: &[(u64, &str, u64)]) -> Value {
    let items: Vec<Value> = repos
        .iter()
        .map(|(id, name, stars)| {
            json!({
                "id": id,
                "full_name": name,
                "html_url": format!("https://github.com/{name}"),
                "description": format!("{name} is a fast async runtime for rust services"),
                "stargazers_count": stars,
                "forks_count": 0,
                "language": "Rust",
                "topics": ["rust", "async"],
            })
        })
        .collect();
    json!({ "total_count": items.len(), "items": items })
}

pub async fn mount_repos(server: &MockServer, repos: &[(u64, &str, u64)]) {
    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repos_body(repos)))
        .mount(server)
        .await;
}

pub async fn mount_tweet_ok(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "1850000000000000001"}})),
        )
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub async fn seed_item(
    pool: &SqlitePool,
    external_id: &str,
    text: &str,
    observed_at: DateTime<Utc>,
) -> String {
    let item = NewTrendItem::from_raw(
        Source::Hackernews,
        RawItem {
            external_id: Some(external_id.to_string()),
            text: text.to_string(),
            url: format!("https://news.ycombinator.com/item?id={external_id}"),
            posted_at: Some(observed_at),
            engagement_score: 50.0,
            ..RawItem::default()
        },
        observed_at,
    );
    trendbot_db::upsert_trend_item(pool, &item, observed_at)
        .await
        .unwrap();
    item.id
}

pub async fn seed_analysis(
    pool: &SqlitePool,
    summary: &str,
    moderation_passed: bool,
    created_at: DateTime<Utc>,
) -> AnalysisResult {
    trendbot_db::insert_analysis(
        pool,
        &NewAnalysis {
            window_start: created_at - chrono::Duration::hours(24),
            window_end: created_at,
            summary_text: summary.to_string(),
            sentiment_score: 0.2,
            source_item_ids: vec!["seed-item".to_string()],
            moderation_passed,
            metadata: json!({ "top_topics": ["rust", "tokio"] }),
        },
        created_at,
    )
    .await
    .unwrap()
}
