//! Integration tests for source adapters using wiremock HTTP mocks.

use chrono::{Duration, TimeZone, Utc};
use trendbot_sources::{
    GithubAdapter, HackernewsAdapter, HttpSettings, RedditAdapter, SourceAdapter, SourceError,
    TwitterAdapter,
};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http() -> HttpSettings {
    HttpSettings {
        user_agent: "trendbot-test/0.1".to_string(),
        timeout_secs: 5,
    }
}

fn week_ago() -> chrono::DateTime<Utc> {
    Utc::now() - Duration::days(7)
}

// ---------------------------------------------------------------------------
// Hacker News
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hackernews_returns_stories_in_rank_order() {
    let server = MockServer::start().await;
    let now = Utc::now().timestamp();

    Mock::given(method("GET"))
        .and(path("/v0/topstories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([3, 1, 2])))
        .mount(&server)
        .await;

    for (id, title, kind) in [(1, "Second", "story"), (2, "A job", "job"), (3, "First", "story")] {
        Mock::given(method("GET"))
            .and(path(format!("/v0/item/{id}.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": id,
                "type": kind,
                "title": title,
                "score": 100,
                "descendants": 20,
                "by": "pg",
                "time": now,
            })))
            .mount(&server)
            .await;
    }

    let adapter: SourceAdapter = HackernewsAdapter::with_base_url(&http(), &server.uri())
        .unwrap()
        .into();
    let items = adapter.fetch(week_ago(), 10).await.expect("fetch");

    let titles: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);
    assert_eq!(items[0].external_id.as_deref(), Some("3"));
    assert_eq!(items[0].url, "https://news.ycombinator.com/item?id=3");
    assert!((items[0].engagement_score - 120.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn hackernews_skips_failed_item_lookups() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v0/topstories.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/item/1.json"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v0/item/2.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 2,
            "type": "story",
            "title": "Survivor",
            "url": "https://example.com/survivor",
            "time": Utc::now().timestamp(),
        })))
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(HackernewsAdapter::with_base_url(&http(), &server.uri()).unwrap());
    let items = adapter.fetch(week_ago(), 10).await.expect("fetch");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].url, "https://example.com/survivor");
}

#[tokio::test]
async fn hackernews_listing_failure_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v0/topstories.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(HackernewsAdapter::with_base_url(&http(), &server.uri()).unwrap());
    let err = adapter.fetch(week_ago(), 10).await.unwrap_err();
    assert!(
        matches!(err, SourceError::UnexpectedStatus { status: 503, .. }),
        "got {err:?}"
    );
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

#[tokio::test]
async fn github_searches_recent_repositories_by_stars() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2026, 10, 12, 8, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/search/repositories"))
        .and(query_param("q", "created:>=2026-10-12"))
        .and(query_param("sort", "stars"))
        .and(query_param("per_page", "2"))
        .and(header("authorization", "Bearer gh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "total_count": 2,
            "items": [
                {
                    "id": 11,
                    "full_name": "acme/rocket",
                    "html_url": "https://github.com/acme/rocket",
                    "description": "A fast thing",
                    "stargazers_count": 900,
                    "forks_count": 100,
                    "language": "Rust",
                    "topics": ["rust", "cli"]
                },
                {
                    "id": 12,
                    "full_name": "acme/quiet",
                    "html_url": "https://github.com/acme/quiet",
                    "description": null,
                    "stargazers_count": 5,
                    "forks_count": 0
                }
            ]
        })))
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(
        GithubAdapter::with_base_url(&http(), Some("gh-token".to_string()), &server.uri()).unwrap(),
    );
    let items = adapter.fetch(since, 2).await.expect("fetch");

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].text, "acme/rocket: A fast thing");
    assert_eq!(items[1].text, "acme/quiet");
    assert!((items[0].engagement_score - 1000.0).abs() < f64::EPSILON);
    assert_eq!(items[0].metadata["language"], "Rust");
    assert!(items[0].posted_at.is_none());
}

// ---------------------------------------------------------------------------
// Reddit
// ---------------------------------------------------------------------------

fn reddit_listing(posts: &[(&str, &str, i64, bool)]) -> serde_json::Value {
    #[allow(clippy::cast_precision_loss)]
    let created = Utc::now().timestamp() as f64;
    let children: Vec<_> = posts
        .iter()
        .map(|(name, title, score, stickied)| {
            serde_json::json!({
                "kind": "t3",
                "data": {
                    "name": name,
                    "title": title,
                    "permalink": format!("/r/rust/comments/{name}/"),
                    "subreddit": "rust",
                    "score": score,
                    "num_comments": 1,
                    "created_utc": created,
                    "stickied": stickied,
                }
            })
        })
        .collect();
    serde_json::json!({ "kind": "Listing", "data": { "children": children } })
}

#[tokio::test]
async fn reddit_merges_subreddits_and_drops_stickied() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reddit_listing(&[
            ("t3_a", "Weekly thread", 5, true),
            ("t3_b", "Rust 2026 edition", 400, false),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/programming/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reddit_listing(&[(
            "t3_c",
            "Tabs vs spaces",
            50,
            false,
        )])))
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(
        RedditAdapter::with_base_url(
            &http(),
            vec!["rust".to_string(), "programming".to_string()],
            &server.uri(),
        )
        .unwrap(),
    );
    let items = adapter.fetch(week_ago(), 10).await.expect("fetch");

    let ids: Vec<_> = items.iter().filter_map(|i| i.external_id.as_deref()).collect();
    assert_eq!(ids, vec!["t3_b", "t3_c"]);
    assert_eq!(items[0].url, "https://www.reddit.com/r/rust/comments/t3_b/");
}

#[tokio::test]
async fn reddit_tolerates_one_failing_subreddit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(reddit_listing(&[(
            "t3_b", "Rust", 10, false,
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/private/hot.json"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(
        RedditAdapter::with_base_url(
            &http(),
            vec!["rust".to_string(), "private".to_string()],
            &server.uri(),
        )
        .unwrap(),
    );
    assert_eq!(adapter.fetch(week_ago(), 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reddit_fails_when_every_subreddit_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(
        RedditAdapter::with_base_url(&http(), vec!["rust".to_string()], &server.uri()).unwrap(),
    );
    let err = adapter.fetch(week_ago(), 10).await.unwrap_err();
    assert!(matches!(err, SourceError::AllRequestsFailed { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Twitter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn twitter_recent_search_maps_metrics() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .and(query_param("query", "rust lang:en"))
        .and(query_param("max_results", "10"))
        .and(header("authorization", "Bearer tw-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "1850000000000000000",
                "text": "Rust   is\nfun",
                "created_at": "2026-10-19T08:00:00.000Z",
                "author_id": "42",
                "public_metrics": {
                    "retweet_count": 3,
                    "reply_count": 1,
                    "like_count": 10,
                    "quote_count": 0
                }
            }],
            "meta": { "result_count": 1 }
        })))
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(
        TwitterAdapter::with_base_url(
            &http(),
            "tw-token".to_string(),
            "rust lang:en".to_string(),
            &server.uri(),
        )
        .unwrap(),
    );
    let items = adapter.fetch(week_ago(), 5).await.expect("fetch");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "Rust is fun");
    assert!((items[0].engagement_score - 17.0).abs() < f64::EPSILON);
    assert_eq!(
        items[0].posted_at,
        Some(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap())
    );
}

#[tokio::test]
async fn twitter_empty_result_has_no_data_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/2/tweets/search/recent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "meta": { "result_count": 0 } })),
        )
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(
        TwitterAdapter::with_base_url(&http(), "t".to_string(), "q".to_string(), &server.uri())
            .unwrap(),
    );
    assert!(adapter.fetch(week_ago(), 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_limit_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = SourceAdapter::from(HackernewsAdapter::with_base_url(&http(), &server.uri()).unwrap());
    assert!(adapter.fetch(week_ago(), 0).await.unwrap().is_empty());
}
