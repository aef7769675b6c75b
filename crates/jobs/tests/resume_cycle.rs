//! End-to-end suspend/resume cycles against the in-memory backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{TimeDelta, Utc};
use serde_json::json;

use resumable_core::{Clock, ManualClock, State};
use resumable_jobs::{
    ExecutorConfig, InMemoryScheduler, ResumableExecutor, ResumableTask, ResumeError,
    RunOutcome, Scheduler, SchedulingError, SuspendSignal, TaskControl,
};

#[derive(Debug, PartialEq)]
enum ExportError {
    BadCursor,
}

/// Exports `total` pages, at most `quota` per attempt, and keeps an API token
/// in state that must never reach the scheduler.
struct PagedExport {
    total: u64,
    quota: u64,
    performed: AtomicU32,
}

impl PagedExport {
    fn new(total: u64, quota: u64) -> Self {
        Self {
            total,
            quota,
            performed: AtomicU32::new(0),
        }
    }
}

impl ResumableTask for PagedExport {
    type Error = ExportError;

    fn name(&self) -> &str {
        "paged-export"
    }

    fn perform(&self, state: &State, _attempt: u32) -> Result<TaskControl, ExportError> {
        self.performed.fetch_add(1, Ordering::SeqCst);

        let page = match state.get("page") {
            None => 0,
            Some(v) => v.as_u64().ok_or(ExportError::BadCursor)?,
        };
        let next = (page + self.quota).min(self.total);

        if next == self.total {
            return Ok(TaskControl::Complete);
        }

        Ok(SuspendSignal::new("rate limited")
            .with_update("page", next)
            .with_update("token", "fresh-token")
            .into())
    }

    fn filter_state(&self, mut state: State) -> State {
        state.remove("token");
        state
    }
}

fn setup() -> (
    ResumableExecutor<Arc<InMemoryScheduler>, Arc<ManualClock>>,
    Arc<InMemoryScheduler>,
    Arc<ManualClock>,
) {
    let scheduler = InMemoryScheduler::arc();
    let clock = ManualClock::arc(Utc::now());
    let config = ExecutorConfig::default().with_name("export-test");
    let executor = ResumableExecutor::from_config(&config, scheduler.clone(), clock.clone())
        .expect("valid config");
    (executor, scheduler, clock)
}

#[test]
fn export_runs_to_completion_across_resumes() {
    let (executor, scheduler, clock) = setup();
    let task = PagedExport::new(10, 3);
    let start = clock.now();

    let first = executor
        .run_task(&task, State::new().with("token", "initial"))
        .unwrap();
    assert!(first.is_suspended());

    let mut resume_times = vec![first.suspension().unwrap().resume_at];
    let mut completed = 0;

    while let Some(due) = scheduler.next_due_at() {
        for entry in scheduler.pending() {
            assert!(!entry.state.contains_key("token"));
        }

        clock.set(due);
        let report = executor.drive_due(&scheduler, &task).unwrap();
        assert!(report.failed.is_empty());

        completed += report.completed.len();
        resume_times.extend(report.suspended.iter().map(|s| s.resume_at));
    }

    // Pages 0..3, 3..6, 6..9 suspend; 9..10 completes.
    assert_eq!(completed, 1);
    assert_eq!(task.performed.load(Ordering::SeqCst), 4);
    assert_eq!(
        resume_times,
        vec![
            start + TimeDelta::minutes(1),
            start + TimeDelta::minutes(1) + TimeDelta::minutes(2),
            start + TimeDelta::minutes(3) + TimeDelta::minutes(4),
        ]
    );

    let stats = executor.stats();
    assert_eq!(stats.runs, 4);
    assert_eq!(stats.suspended, 3);
    assert_eq!(stats.completed, 1);
}

#[test]
fn scheduled_state_carries_progress_and_attempt() {
    let (executor, scheduler, _clock) = setup();
    let task = PagedExport::new(10, 4);

    executor
        .run_task(&task, State::from_value(json!({"page": 4, "attempt": 1})).unwrap())
        .unwrap();

    let pending = scheduler.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(
        pending[0].state,
        State::from_value(json!({"page": 8, "attempt": 2})).unwrap()
    );
}

#[test]
fn task_failure_is_returned_not_scheduled() {
    let (executor, scheduler, _clock) = setup();
    let task = PagedExport::new(10, 4);

    let outcome = executor
        .run_task(&task, State::new().with("page", "nope"))
        .unwrap();

    assert_eq!(outcome, RunOutcome::Failed(ExportError::BadCursor));
    assert!(scheduler.is_empty());
}

#[test]
fn failed_reschedule_puts_claimed_entries_back() {
    let scheduler = InMemoryScheduler::arc();
    let clock = ManualClock::arc(Utc::now());
    let task = PagedExport::new(100, 1);

    // Two due resumes, then the backend goes away.
    let first = scheduler
        .schedule(clock.now(), State::new().with("page", 1))
        .unwrap();
    let second = scheduler
        .schedule(clock.now() + TimeDelta::seconds(1), State::new().with("page", 2))
        .unwrap();
    clock.advance(TimeDelta::seconds(1));
    scheduler.close();

    let executor = ResumableExecutor::new(scheduler.clone()).with_clock(clock.clone());
    let err = executor.drive_due(&scheduler, &task).unwrap_err();

    assert!(matches!(err, ResumeError::Scheduling(SchedulingError::Unavailable(_))));
    assert_eq!(task.performed.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.len(), 2);
    assert_eq!(
        scheduler.get(first).map(|e| e.state),
        Some(State::new().with("page", 1))
    );
    assert!(scheduler.get(second).is_some());
}

#[test]
fn malformed_resume_is_reported_and_the_rest_still_run() {
    let (executor, scheduler, clock) = setup();
    let task = PagedExport::new(10, 10);

    let poisoned = scheduler
        .schedule(
            clock.now(),
            State::from_value(json!({"page": 3, "attempt": "three"})).unwrap(),
        )
        .unwrap();
    let healthy = scheduler
        .schedule(clock.now() + TimeDelta::seconds(1), State::new().with("page", 5))
        .unwrap();
    clock.advance(TimeDelta::seconds(1));

    let report = executor.drive_due(&scheduler, &task).unwrap();

    assert_eq!(report.completed, vec![healthy]);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].0.handle, poisoned);
    assert!(matches!(report.rejected[0].1, ResumeError::InvalidArgument(_)));
    assert_eq!(task.performed.load(Ordering::SeqCst), 1);
    assert!(scheduler.is_empty());
}

#[test]
fn independent_tasks_share_one_executor() {
    let (executor, scheduler, _clock) = setup();
    let executor = Arc::new(executor);

    let handles: Vec<_> = (0..4u64)
        .map(|i| {
            let executor = executor.clone();
            std::thread::spawn(move || {
                let task = PagedExport::new(100, 10);
                executor
                    .run_task(&task, State::new().with("page", i * 10))
                    .unwrap()
                    .is_suspended()
            })
        })
        .collect();

    for h in handles {
        assert!(h.join().unwrap());
    }
    assert_eq!(scheduler.len(), 4);
}
