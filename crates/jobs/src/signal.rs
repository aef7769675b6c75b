//! Suspension requests raised by task bodies.

use chrono::{DateTime, Utc};
use serde_json::Value;

use resumable_core::State;

/// Request to abort the current attempt and run the task again later.
///
/// This is control flow, not a failure. Task bodies hand it back through the
/// `Ok` channel as [`TaskControl::Suspend`], so it can never be mistaken for
/// an error by `?` or generic error handling.
#[derive(Debug, Clone, PartialEq)]
pub struct SuspendSignal {
    state_update: State,
    resume_at: Option<DateTime<Utc>>,
    reason: String,
}

impl SuspendSignal {
    /// New signal with an empty state update and no explicit resume time.
    ///
    /// `reason` must be non-empty; the executor rejects blank reasons.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            state_update: State::new(),
            resume_at: None,
            reason: reason.into(),
        }
    }

    /// Replace the partial state update.
    pub fn with_state_update(mut self, update: State) -> Self {
        self.state_update = update;
        self
    }

    /// Add a single key to the partial state update.
    pub fn with_update(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state_update.insert(key, value);
        self
    }

    /// Resume at an explicit point in time instead of backing off.
    pub fn resume_at(mut self, at: DateTime<Utc>) -> Self {
        self.resume_at = Some(at);
        self
    }

    pub fn state_update(&self) -> &State {
        &self.state_update
    }

    pub fn requested_resume_at(&self) -> Option<DateTime<Utc>> {
        self.resume_at
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub(crate) fn into_parts(self) -> (State, Option<DateTime<Utc>>, String) {
        (self.state_update, self.resume_at, self.reason)
    }
}

impl std::fmt::Display for SuspendSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "suspend requested: {}", self.reason)
    }
}

/// What a task body asks the executor to do once it returns.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum TaskControl {
    /// The task finished its work
    Complete,
    /// Abort this attempt and schedule another one
    Suspend(SuspendSignal),
}

impl TaskControl {
    /// Shorthand for `TaskControl::Suspend(SuspendSignal::new(reason))`.
    pub fn suspend(reason: impl Into<String>) -> Self {
        Self::Suspend(SuspendSignal::new(reason))
    }

    pub fn is_suspend(&self) -> bool {
        matches!(self, TaskControl::Suspend(_))
    }
}

impl From<SuspendSignal> for TaskControl {
    fn from(value: SuspendSignal) -> Self {
        Self::Suspend(value)
    }
}
