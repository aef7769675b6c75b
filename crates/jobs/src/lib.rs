//! Resumable jobs: tasks that suspend themselves and resume later.
//!
//! ## Design
//!
//! - A task body returns [`TaskControl`]; suspension travels in the `Ok`
//!   channel so it is never confused with a failure
//! - The executor merges the suspend update into the task state, applies a
//!   [`StateFilter`], increments the attempt counter and hands the result to
//!   a [`Scheduler`]
//! - Without an explicit resume time, the next attempt is delayed by
//!   exponential backoff (`base * 2^attempt`, one minute by default)
//! - Re-entry is explicit: the backend runs the same task again with the
//!   scheduled state as its full input
//!
//! ## Components
//!
//! - `BackoffCalculator`: attempt counter → resume time
//! - `SuspendSignal` / `TaskControl`: what a task body asks for
//! - `StateFilter`: narrows state before it leaves the process
//! - `Scheduler`: backend boundary (`InMemoryScheduler` for tests/dev)
//! - `ResumableExecutor`: runs attempts and wires the above together

pub mod backoff;
pub mod config;
pub mod executor;
pub mod filter;
pub mod scheduler;
pub mod signal;
pub mod task;

pub use backoff::{BackoffCalculator, BackoffPolicy, DEFAULT_BASE_UNIT};
pub use config::ExecutorConfig;
pub use executor::{
    DriveReport, ExecutorStats, ResumableExecutor, ResumeError, RunOutcome, Suspension,
};
pub use filter::{DropKeys, FnFilter, IdentityFilter, StateFilter, filter_fn};
pub use scheduler::{InMemoryScheduler, ScheduledResume, Scheduler, SchedulingError};
pub use signal::{SuspendSignal, TaskControl};
pub use task::ResumableTask;
