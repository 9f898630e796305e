//! Analysis results and publication receipts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::CoreError;

/// Derived insight over the trend items observed in one window.
///
/// Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub id: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Empty when moderation failed.
    pub summary_text: String,
    /// In `[-1.0, 1.0]`.
    pub sentiment_score: f64,
    pub source_item_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub moderation_passed: bool,
    /// Per-source counts and top topics computed alongside the summary.
    pub metadata: Value,
}

/// An analysis result that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAnalysis {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub summary_text: String,
    pub sentiment_score: f64,
    pub source_item_ids: Vec<String>,
    pub moderation_passed: bool,
    pub metadata: Value,
}

impl NewAnalysis {
    /// Check the invariants every stored analysis must hold.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAnalysis`] if the window is empty or
    /// inverted, no source items are referenced, or the sentiment score is
    /// outside `[-1.0, 1.0]`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.window_end <= self.window_start {
            return Err(CoreError::InvalidAnalysis(format!(
                "window_end {} is not after window_start {}",
                self.window_end, self.window_start
            )));
        }
        if self.source_item_ids.is_empty() {
            return Err(CoreError::InvalidAnalysis(
                "source_item_ids must not be empty".to_string(),
            ));
        }
        if !self.sentiment_score.is_finite() || !(-1.0..=1.0).contains(&self.sentiment_score) {
            return Err(CoreError::InvalidAnalysis(format!(
                "sentiment_score {} outside [-1, 1]",
                self.sentiment_score
            )));
        }
        Ok(())
    }
}

/// Outcome recorded on a publication receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// Quota slot reserved; the publish call is in flight.
    Pending,
    Success,
    Failed,
    SkippedQuota,
    SkippedValidation,
}

impl ReceiptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiptStatus::Pending => "pending",
            ReceiptStatus::Success => "success",
            ReceiptStatus::Failed => "failed",
            ReceiptStatus::SkippedQuota => "skipped_quota",
            ReceiptStatus::SkippedValidation => "skipped_validation",
        }
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReceiptStatus::Pending),
            "success" => Ok(ReceiptStatus::Success),
            "failed" => Ok(ReceiptStatus::Failed),
            "skipped_quota" => Ok(ReceiptStatus::SkippedQuota),
            "skipped_validation" => Ok(ReceiptStatus::SkippedValidation),
            other => Err(CoreError::UnknownVariant {
                kind: "receipt status",
                value: other.to_string(),
            }),
        }
    }
}

/// Durable record of one publish decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicationReceipt {
    pub id: i64,
    /// `None` when no eligible analysis existed at decision time.
    pub analysis_id: Option<i64>,
    pub published_at: DateTime<Utc>,
    /// Site-local calendar day the decision counts against.
    pub publish_day: NaiveDate,
    pub status: ReceiptStatus,
    /// Present only on success.
    pub external_ref: Option<String>,
    pub content: Option<String>,
    pub error_detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn valid() -> NewAnalysis {
        let end = Utc::now();
        NewAnalysis {
            window_start: end - Duration::hours(24),
            window_end: end,
            summary_text: "Rust is trending".to_string(),
            sentiment_score: 0.4,
            source_item_ids: vec!["abc".to_string()],
            moderation_passed: true,
            metadata: Value::Null,
        }
    }

    #[test]
    fn valid_analysis_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut a = valid();
        a.window_start = a.window_end;
        assert!(matches!(a.validate(), Err(CoreError::InvalidAnalysis(_))));
    }

    #[test]
    fn empty_source_items_are_rejected() {
        let mut a = valid();
        a.source_item_ids.clear();
        assert!(matches!(a.validate(), Err(CoreError::InvalidAnalysis(_))));
    }

    #[test]
    fn out_of_range_sentiment_is_rejected() {
        let mut a = valid();
        a.sentiment_score = 1.5;
        assert!(a.validate().is_err());
        a.sentiment_score = f64::NAN;
        assert!(a.validate().is_err());
    }

    #[test]
    fn receipt_status_parses_stored_values() {
        for status in [
            ReceiptStatus::Pending,
            ReceiptStatus::Success,
            ReceiptStatus::Failed,
            ReceiptStatus::SkippedQuota,
            ReceiptStatus::SkippedValidation,
        ] {
            assert_eq!(status.as_str().parse::<ReceiptStatus>().unwrap(), status);
        }
        assert!("published".parse::<ReceiptStatus>().is_err());
    }
}
