//! Shared domain types and configuration for TrendBot.
//!
//! Everything that crosses a crate boundary lives here: the closed set of
//! trend [`Source`]s, the persisted record types, the job vocabulary used by
//! the scheduler, content fingerprints, and the environment-driven
//! [`AppConfig`].

pub mod analysis;
pub mod app_config;
pub mod config;
pub mod fingerprint;
pub mod items;
pub mod jobs;

use thiserror::Error;

pub use analysis::{AnalysisResult, NewAnalysis, PublicationReceipt, ReceiptStatus};
pub use app_config::{
    AppConfig, Environment, PublisherSettings, SourceSettings, SummarizerSettings,
};
pub use config::{load_app_config, load_app_config_from_env, load_app_config_from_lookup};
pub use fingerprint::{content_fingerprint, item_fingerprint};
pub use items::{NewTrendItem, RawItem, ReconcileOutcome, Source, TrendItem};
pub use jobs::{JobName, JobOutcome, JobRun};

/// Errors raised while loading [`AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Errors raised when converting or validating domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("invalid analysis result: {0}")]
    InvalidAnalysis(String),
}
