//! Job vocabulary shared by the scheduler and the `job_runs` table.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::CoreError;

/// A named, schedulable pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobName {
    Collection,
    Analysis,
    Publishing,
    Cleanup,
}

impl JobName {
    pub const ALL: [JobName; 4] = [
        JobName::Collection,
        JobName::Analysis,
        JobName::Publishing,
        JobName::Cleanup,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobName::Collection => "collection",
            JobName::Analysis => "analysis",
            JobName::Publishing => "publishing",
            JobName::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collection" | "collect" => Ok(JobName::Collection),
            "analysis" | "analyze" => Ok(JobName::Analysis),
            "publishing" | "publish" => Ok(JobName::Publishing),
            "cleanup" => Ok(JobName::Cleanup),
            other => Err(CoreError::UnknownVariant {
                kind: "job name",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Running,
    Success,
    PartialFailure,
    Failure,
}

impl JobOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobOutcome::Running => "running",
            JobOutcome::Success => "success",
            JobOutcome::PartialFailure => "partial_failure",
            JobOutcome::Failure => "failure",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobOutcome {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(JobOutcome::Running),
            "success" => Ok(JobOutcome::Success),
            "partial_failure" => Ok(JobOutcome::PartialFailure),
            "failure" => Ok(JobOutcome::Failure),
            other => Err(CoreError::UnknownVariant {
                kind: "job outcome",
                value: other.to_string(),
            }),
        }
    }
}

/// One execution of a scheduled or manual job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRun {
    pub id: i64,
    pub public_id: Uuid,
    pub job_name: JobName,
    /// `schedule` or `manual`.
    pub trigger_source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: JobOutcome,
    pub error_detail: Option<String>,
    /// Structured pipeline report, `null` while running.
    pub summary: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_names_accept_verb_aliases() {
        assert_eq!("collect".parse::<JobName>().unwrap(), JobName::Collection);
        assert_eq!("Publish".parse::<JobName>().unwrap(), JobName::Publishing);
        assert!("visualize".parse::<JobName>().is_err());
    }

    #[test]
    fn outcomes_round_trip() {
        for outcome in [
            JobOutcome::Running,
            JobOutcome::Success,
            JobOutcome::PartialFailure,
            JobOutcome::Failure,
        ] {
            assert_eq!(outcome.as_str().parse::<JobOutcome>().unwrap(), outcome);
        }
    }
}
