//! In-process job slots: at most one running invocation per job name.

use std::collections::HashMap;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use trendbot_core::JobName;

/// Which jobs are running in this process, and since when.
#[derive(Debug, Default)]
pub struct SchedulerState {
    running: Mutex<HashMap<JobName, DateTime<Utc>>>,
    /// Runs whose outcome could not be written; their rows are still
    /// `running` and must be failed before the job starts again.
    unfinished: Mutex<HashMap<JobName, i64>>,
    released: Notify,
}

/// Holds the slot for one job; dropping it frees the slot.
#[derive(Debug)]
pub struct JobSlot<'a> {
    state: &'a SchedulerState,
    job: JobName,
}

impl Drop for JobSlot<'_> {
    fn drop(&mut self) {
        self.state.lock().remove(&self.job);
        self.state.released.notify_waiters();
    }
}

impl SchedulerState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `job`, or `None` if it is already taken.
    pub fn try_begin(&self, job: JobName, now: DateTime<Utc>) -> Option<JobSlot<'_>> {
        let mut running = self.lock();
        if running.contains_key(&job) {
            return None;
        }
        running.insert(job, now);
        Some(JobSlot { state: self, job })
    }

    /// Start time of the running invocation of `job`, if any.
    #[must_use]
    pub fn running_since(&self, job: JobName) -> Option<DateTime<Utc>> {
        self.lock().get(&job).copied()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock().is_empty()
    }

    /// Resolve once no job holds a slot.
    pub async fn wait_idle(&self) {
        loop {
            let mut released = pin!(self.released.notified());
            released.as_mut().enable();
            if self.is_idle() {
                return;
            }
            released.await;
        }
    }

    /// Remember that run `id` of `job` finished but could not be recorded.
    pub fn remember_unfinished(&self, job: JobName, id: i64) {
        self.unfinished_lock().insert(job, id);
    }

    /// Run id of `job` left `running` by a failed finalize, if any.
    #[must_use]
    pub fn unfinished_run(&self, job: JobName) -> Option<i64> {
        self.unfinished_lock().get(&job).copied()
    }

    pub fn forget_unfinished(&self, job: JobName) {
        self.unfinished_lock().remove(&job);
    }

    fn unfinished_lock(&self) -> MutexGuard<'_, HashMap<JobName, i64>> {
        self.unfinished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobName, DateTime<Utc>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
