//! Trend items as fetched from a source and as stored.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fingerprint::{content_fingerprint, item_fingerprint};
use crate::CoreError;

/// One external trend-data origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Twitter,
    Github,
    Reddit,
    Hackernews,
}

impl Source {
    pub const ALL: [Source; 4] = [
        Source::Twitter,
        Source::Github,
        Source::Reddit,
        Source::Hackernews,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Twitter => "twitter",
            Source::Github => "github",
            Source::Reddit => "reddit",
            Source::Hackernews => "hackernews",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitter" | "x" => Ok(Source::Twitter),
            "github" => Ok(Source::Github),
            "reddit" => Ok(Source::Reddit),
            "hackernews" | "hn" => Ok(Source::Hackernews),
            other => Err(CoreError::UnknownSource(other.to_string())),
        }
    }
}

/// An item as returned by a source adapter, before fingerprinting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    /// Upstream identifier (tweet id, repo full name, post id, story id).
    /// Preferred over `url` as the identity key when present.
    pub external_id: Option<String>,
    pub text: String,
    pub url: String,
    /// When the item was posted upstream, if the source reports it. Kept in
    /// `raw_metadata`; it does not drive `observed_at`.
    pub posted_at: Option<DateTime<Utc>>,
    pub engagement_score: f64,
    pub metadata: Map<String, Value>,
}

/// A fingerprinted item ready to be reconciled against the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTrendItem {
    pub id: String,
    pub source: Source,
    pub text: String,
    pub url: String,
    pub observed_at: DateTime<Utc>,
    pub engagement_score: f64,
    pub raw_metadata: Value,
    pub content_hash: String,
}

impl NewTrendItem {
    /// Fingerprint a raw item fetched at `fetched_at`.
    ///
    /// `observed_at` is always the fetch time, so an item that keeps
    /// trending stays inside recent analysis windows. Negative or
    /// non-finite engagement is clamped to `0.0`.
    #[must_use]
    pub fn from_raw(source: Source, raw: RawItem, fetched_at: DateTime<Utc>) -> Self {
        let id = item_fingerprint(source, &raw);
        let content_hash = content_fingerprint(&raw.text, &raw.url);
        let engagement_score = if raw.engagement_score.is_finite() {
            raw.engagement_score.max(0.0)
        } else {
            0.0
        };

        let mut metadata = raw.metadata;
        if let Some(posted_at) = raw.posted_at {
            metadata.insert("posted_at".to_string(), Value::String(posted_at.to_rfc3339()));
        }

        Self {
            id,
            source,
            text: raw.text,
            url: raw.url,
            observed_at: fetched_at,
            engagement_score,
            raw_metadata: Value::Object(metadata),
            content_hash,
        }
    }
}

/// A stored trend item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendItem {
    pub id: String,
    pub source: Source,
    pub text: String,
    pub url: String,
    pub observed_at: DateTime<Utc>,
    pub engagement_score: f64,
    pub raw_metadata: Value,
    pub content_hash: String,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What reconciling one fetched item did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    /// No row existed for `(source, id)`.
    Created,
    /// The row existed and its content fingerprint changed.
    Updated,
    /// The row existed with the same content; only engagement and
    /// `observed_at` were refreshed.
    Unchanged,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::Updated => "updated",
            ReconcileOutcome::Unchanged => "unchanged",
        }
    }
}

impl FromStr for ReconcileOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ReconcileOutcome::Created),
            "updated" => Ok(ReconcileOutcome::Updated),
            "unchanged" => Ok(ReconcileOutcome::Unchanged),
            other => Err(CoreError::UnknownVariant {
                kind: "reconcile outcome",
                value: other.to_string(),
            }),
        }
    }
}
