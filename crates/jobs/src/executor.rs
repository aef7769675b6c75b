//! Resumable executor: runs a task body, intercepts suspension requests and
//! hands the next state to a scheduler.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, debug_span, info, warn};

use resumable_core::{ATTEMPT_KEY, Clock, CoreError, JobHandle, State, SystemClock};

use super::backoff::{BackoffCalculator, BackoffPolicy};
use super::config::ExecutorConfig;
use super::filter::{IdentityFilter, StateFilter};
use super::scheduler::{InMemoryScheduler, ScheduledResume, Scheduler, SchedulingError};
use super::signal::{SuspendSignal, TaskControl};
use super::task::{ResumableTask, TaskFilter};

/// Executor error.
///
/// Task failures are not errors of the executor; they come back unchanged in
/// [`RunOutcome::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResumeError {
    /// Malformed input, rejected before any scheduling side effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The scheduler refused the resume request. Never retried here.
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

impl From<CoreError> for ResumeError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidArgument(msg) => Self::InvalidArgument(msg),
            other => Self::InvalidArgument(other.to_string()),
        }
    }
}

/// An accepted suspension.
#[derive(Debug, Clone, PartialEq)]
pub struct Suspension {
    /// Handle returned by the scheduler
    pub handle: JobHandle,
    /// When the next attempt should run
    pub resume_at: DateTime<Utc>,
    /// Full input for the next attempt (filtered, attempt incremented)
    pub state: State,
    /// Reason carried by the suspend signal
    pub reason: String,
}

/// How a single attempt ended.
#[derive(Debug, PartialEq)]
pub enum RunOutcome<E> {
    /// The task finished; nothing was scheduled
    Completed,
    /// The task asked to be resumed later and the scheduler accepted it
    Suspended(Suspension),
    /// The task failed with its own error; nothing was scheduled
    Failed(E),
}

impl<E> RunOutcome<E> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    pub fn suspension(&self) -> Option<&Suspension> {
        match self {
            RunOutcome::Suspended(s) => Some(s),
            _ => None,
        }
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutorStats {
    pub runs: u64,
    pub completed: u64,
    pub suspended: u64,
    pub failed: u64,
    pub scheduling_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    runs: AtomicU64,
    completed: AtomicU64,
    suspended: AtomicU64,
    failed: AtomicU64,
    scheduling_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ExecutorStats {
        ExecutorStats {
            runs: self.runs.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            suspended: self.suspended.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            scheduling_errors: self.scheduling_errors.load(Ordering::Relaxed),
        }
    }
}

/// Result of [`ResumableExecutor::drive_due`].
#[derive(Debug)]
pub struct DriveReport<E> {
    pub completed: Vec<JobHandle>,
    pub suspended: Vec<Suspension>,
    pub failed: Vec<(JobHandle, E)>,
    /// Entries the executor refused to run or reschedule (malformed attempt
    /// counter, blank reason). They are no longer in the scheduler.
    pub rejected: Vec<(ScheduledResume, ResumeError)>,
}

impl<E> Default for DriveReport<E> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            suspended: Vec::new(),
            failed: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

impl<E> DriveReport<E> {
    /// Number of claimed resumes accounted for.
    pub fn total(&self) -> usize {
        self.completed.len() + self.suspended.len() + self.failed.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Runs task attempts and turns suspension requests into scheduled resumes.
///
/// The executor is synchronous: each call runs one attempt to completion on
/// the calling thread. It keeps no per-task state, so one executor can serve
/// many independent tasks concurrently.
pub struct ResumableExecutor<S, C = SystemClock> {
    scheduler: S,
    backoff: BackoffCalculator<C>,
    filter: Box<dyn StateFilter>,
    name: String,
    counters: Counters,
}

impl<S: Scheduler> ResumableExecutor<S, SystemClock> {
    /// Executor with the default configuration and the wall clock.
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            backoff: BackoffCalculator::default(),
            filter: Box::new(IdentityFilter),
            name: ExecutorConfig::default().name,
            counters: Counters::default(),
        }
    }
}

impl<S: Scheduler, C: Clock> ResumableExecutor<S, C> {
    /// Executor built from a configuration, reading time from `clock`.
    pub fn from_config(
        config: &ExecutorConfig,
        scheduler: S,
        clock: C,
    ) -> Result<Self, ResumeError> {
        let policy = config.backoff_policy()?;
        Ok(Self {
            scheduler,
            backoff: BackoffCalculator::with_clock(policy, clock),
            filter: Box::new(IdentityFilter),
            name: config.name.clone(),
            counters: Counters::default(),
        })
    }

    /// Swap the time source.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> ResumableExecutor<S, C2> {
        ResumableExecutor {
            backoff: BackoffCalculator::with_clock(*self.backoff.policy(), clock),
            scheduler: self.scheduler,
            filter: self.filter,
            name: self.name,
            counters: self.counters,
        }
    }

    /// Swap the backoff policy.
    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Result<Self, ResumeError> {
        let policy = policy.validated()?;
        self.backoff = self.backoff.with_policy(policy);
        Ok(self)
    }

    /// Filter applied by [`run`](Self::run). Tasks run through
    /// [`run_task`](Self::run_task) use their own `filter_state` instead.
    pub fn with_filter(mut self, filter: impl StateFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn backoff(&self) -> &BackoffCalculator<C> {
        &self.backoff
    }

    pub fn stats(&self) -> ExecutorStats {
        self.counters.snapshot()
    }

    /// Run one attempt of `task_body` against `initial_state`.
    ///
    /// The body receives the attempt counter read from the state. If it
    /// returns [`TaskControl::Suspend`], the signal's update is merged into
    /// the state (update wins), the executor's filter is applied, the attempt
    /// counter is incremented and the result is handed to the scheduler at
    /// the requested time or after exponential backoff.
    pub fn run<E, F>(
        &self,
        initial_state: State,
        task_body: F,
    ) -> Result<RunOutcome<E>, ResumeError>
    where
        F: FnOnce(u32) -> Result<TaskControl, E>,
    {
        self.run_with_filter(initial_state, self.filter.as_ref(), task_body)
    }

    /// Run one attempt of `task` against `state`, using the task's own
    /// `filter_state` hook.
    pub fn run_task<T>(
        &self,
        task: &T,
        state: State,
    ) -> Result<RunOutcome<T::Error>, ResumeError>
    where
        T: ResumableTask + ?Sized,
    {
        let _span = debug_span!("run_task", executor = %self.name, task = task.name()).entered();
        let input = state.clone();
        self.run_with_filter(state, &TaskFilter(task), |attempt| {
            task.perform(&input, attempt)
        })
    }

    /// Re-enter `task` for every resume in `source` that is due now.
    ///
    /// Due entries are claimed up front and run in resume-time order.
    /// Entries the executor rejects as malformed are reported in
    /// [`DriveReport::rejected`] and the drive goes on. If an entry cannot be
    /// rescheduled, it and every entry not yet run are put back and the
    /// scheduling error is returned.
    pub fn drive_due<T>(
        &self,
        source: &InMemoryScheduler,
        task: &T,
    ) -> Result<DriveReport<T::Error>, ResumeError>
    where
        T: ResumableTask + ?Sized,
    {
        let now = self.backoff.clock().now();
        let mut claimed = source.claim_due(now).into_iter();
        let mut report = DriveReport::default();

        while let Some(entry) = claimed.next() {
            debug!(
                executor = %self.name,
                job_handle = %entry.handle,
                resume_at = %entry.resume_at,
                "resuming task"
            );

            match self.run_task(task, entry.state.clone()) {
                Ok(RunOutcome::Completed) => report.completed.push(entry.handle),
                Ok(RunOutcome::Suspended(s)) => report.suspended.push(s),
                Ok(RunOutcome::Failed(e)) => report.failed.push((entry.handle, e)),
                Err(e @ ResumeError::InvalidArgument(_)) => {
                    warn!(
                        executor = %self.name,
                        job_handle = %entry.handle,
                        error = %e,
                        "rejected scheduled resume"
                    );
                    report.rejected.push((entry, e));
                }
                Err(e @ ResumeError::Scheduling(_)) => {
                    source.requeue(entry);
                    for rest in claimed {
                        source.requeue(rest);
                    }
                    return Err(e);
                }
            }
        }

        Ok(report)
    }

    fn run_with_filter<E, F>(
        &self,
        initial_state: State,
        filter: &dyn StateFilter,
        task_body: F,
    ) -> Result<RunOutcome<E>, ResumeError>
    where
        F: FnOnce(u32) -> Result<TaskControl, E>,
    {
        let attempt = initial_state.attempt()?;

        Counters::bump(&self.counters.runs);
        debug!(executor = %self.name, attempt, "running attempt");

        match task_body(attempt) {
            Ok(TaskControl::Complete) => {
                Counters::bump(&self.counters.completed);
                debug!(executor = %self.name, attempt, "attempt completed");
                Ok(RunOutcome::Completed)
            }
            Ok(TaskControl::Suspend(signal)) => self
                .suspend(initial_state, attempt, signal, filter)
                .map(RunOutcome::Suspended),
            Err(e) => {
                Counters::bump(&self.counters.failed);
                Ok(RunOutcome::Failed(e))
            }
        }
    }

    fn suspend(
        &self,
        initial_state: State,
        attempt: u32,
        signal: SuspendSignal,
        filter: &dyn StateFilter,
    ) -> Result<Suspension, ResumeError> {
        let (update, requested_at, reason) = signal.into_parts();

        if reason.trim().is_empty() {
            return Err(CoreError::invalid_argument("suspend reason must not be empty").into());
        }
        let next_attempt = attempt.checked_add(1).ok_or_else(|| {
            CoreError::invalid_argument(format!("attempt counter exhausted at {attempt}"))
        })?;

        let merged = initial_state.merged(&update);
        let resume_at = requested_at.unwrap_or_else(|| self.backoff.compute(attempt));
        let state = filter.filter(merged).with(ATTEMPT_KEY, next_attempt);

        let handle = match self.scheduler.schedule(resume_at, state.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                Counters::bump(&self.counters.scheduling_errors);
                warn!(
                    executor = %self.name,
                    attempt,
                    reason = %reason,
                    error = %e,
                    "failed to schedule resume"
                );
                return Err(e.into());
            }
        };

        Counters::bump(&self.counters.suspended);
        info!(
            executor = %self.name,
            job_handle = %handle,
            attempt,
            next_attempt,
            resume_at = %resume_at,
            reason = %reason,
            "task suspended"
        );

        Ok(Suspension {
            handle,
            resume_at,
            state,
            reason,
        })
    }
}
