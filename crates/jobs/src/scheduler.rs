//! Scheduler boundary and an in-memory backend.
//!
//! The executor only ever calls [`Scheduler::schedule`]. How a scheduled
//! `(resume_at, state)` pair is persisted and turned back into a task run is
//! the backend's business; [`InMemoryScheduler`] is the in-process reference
//! used by tests, the worker binary and
//! [`ResumableExecutor::drive_due`](crate::ResumableExecutor::drive_due).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use resumable_core::{JobHandle, State};

/// Accepts resume requests and arranges for the task to run again.
pub trait Scheduler: Send + Sync {
    /// Arrange a future run of the same task with `state` as its full input.
    fn schedule(&self, resume_at: DateTime<Utc>, state: State)
    -> Result<JobHandle, SchedulingError>;
}

/// Scheduler error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("scheduler unavailable: {0}")]
    Unavailable(String),
    #[error("resume request rejected: {0}")]
    Rejected(String),
    #[error("scheduled resume not found: {0}")]
    NotFound(JobHandle),
    #[error("state serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SchedulingError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    fn schedule(
        &self,
        resume_at: DateTime<Utc>,
        state: State,
    ) -> Result<JobHandle, SchedulingError> {
        (**self).schedule(resume_at, state)
    }
}

/// A resume request accepted by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledResume {
    pub handle: JobHandle,
    /// When the task should run again
    pub resume_at: DateTime<Utc>,
    /// Full input for the next run
    pub state: State,
    /// When the request was accepted
    pub scheduled_at: DateTime<Utc>,
}

impl ScheduledResume {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.resume_at <= now
    }
}

/// In-memory scheduler for tests/dev.
///
/// With [`with_max_state_bytes`](Self::with_max_state_bytes), state is
/// encoded with `serde_json` on the way in and oversized requests are
/// rejected, the way a queue with a message size limit would.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    entries: RwLock<HashMap<JobHandle, ScheduledResume>>,
    capacity: Option<usize>,
    max_state_bytes: Option<usize>,
    closed: AtomicBool,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Reject new requests once `capacity` entries are pending.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    /// Reject requests whose JSON-encoded state exceeds `limit` bytes.
    pub fn with_max_state_bytes(mut self, limit: usize) -> Self {
        self.max_state_bytes = Some(limit);
        self
    }

    /// Stop accepting requests; later `schedule` calls fail with `Unavailable`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, handle: JobHandle) -> Option<ScheduledResume> {
        self.read().get(&handle).cloned()
    }

    /// Drop a pending request.
    pub fn cancel(&self, handle: JobHandle) -> Result<ScheduledResume, SchedulingError> {
        self.write()
            .remove(&handle)
            .ok_or(SchedulingError::NotFound(handle))
    }

    /// Put a previously claimed request back, keeping its handle.
    ///
    /// Capacity is not checked; the request was already accepted once.
    pub fn requeue(&self, entry: ScheduledResume) {
        self.write().insert(entry.handle, entry);
    }

    /// All pending requests, earliest resume time first.
    pub fn pending(&self) -> Vec<ScheduledResume> {
        let mut result: Vec<_> = self.read().values().cloned().collect();
        sort_for_dispatch(&mut result);
        result
    }

    /// Earliest pending resume time, if any.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        self.read().values().map(|e| e.resume_at).min()
    }

    /// Remove and return every request due at `now`, earliest first.
    pub fn claim_due(&self, now: DateTime<Utc>) -> Vec<ScheduledResume> {
        let mut entries = self.write();

        let due: Vec<JobHandle> = entries
            .values()
            .filter(|e| e.is_due(now))
            .map(|e| e.handle)
            .collect();

        let mut claimed: Vec<_> = due
            .into_iter()
            .filter_map(|handle| entries.remove(&handle))
            .collect();

        sort_for_dispatch(&mut claimed);
        claimed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobHandle, ScheduledResume>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobHandle, ScheduledResume>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sort_for_dispatch(entries: &mut [ScheduledResume]) {
    entries.sort_by_key(|e| (e.resume_at, e.scheduled_at, e.handle));
}

impl Scheduler for InMemoryScheduler {
    fn schedule(
        &self,
        resume_at: DateTime<Utc>,
        state: State,
    ) -> Result<JobHandle, SchedulingError> {
        if self.is_closed() {
            return Err(SchedulingError::Unavailable(
                "in-memory scheduler is closed".to_string(),
            ));
        }

        if let Some(limit) = self.max_state_bytes {
            let encoded = serde_json::to_vec(&state)?;
            if encoded.len() > limit {
                return Err(SchedulingError::Rejected(format!(
                    "encoded state is {} bytes, limit is {limit}",
                    encoded.len()
                )));
            }
        }

        let mut entries = self.write();
        if let Some(capacity) = self.capacity {
            if entries.len() >= capacity {
                return Err(SchedulingError::Rejected(format!(
                    "capacity of {capacity} pending resumes reached"
                )));
            }
        }

        let handle = JobHandle::new();
        entries.insert(
            handle,
            ScheduledResume {
                handle,
                resume_at,
                state,
                scheduled_at: Utc::now(),
            },
        );
        Ok(handle)
    }
}
