//! Orchestration core for TrendBot.
//!
//! Drives the collection, analysis, publishing, and cleanup pipelines over
//! the store, and schedules them with per-job mutual exclusion. The
//! [`TrendBot`] facade is the surface front ends use.

pub mod analyze;
pub mod bot;
pub mod cleanup;
pub mod collect;
pub mod context;
pub mod dedup;
pub mod error;
pub mod publish;
pub mod report;
pub mod scheduler;

pub use bot::{CycleReport, CycleStep, TrendBot};
pub use collect::{CollectRequest, CollectionReport, SourceReport};
pub use context::{PipelineContext, PipelineSettings, ScheduleSettings};
pub use dedup::Deduplicator;
pub use error::{PipelineError, SchedulerError, SetupError};
pub use report::TrendReport;
pub use scheduler::{JobState, JobStatus, Scheduler, SchedulerStatus};
