//! Runs a demo catalog sync through suspend/resume cycles against the
//! in-memory scheduler. The clock is simulated: it jumps straight to each
//! resume time instead of sleeping.

use anyhow::{Context, bail};
use chrono::Utc;
use tracing::info;

use resumable_core::{Clock, ManualClock, State};
use resumable_jobs::{
    ExecutorConfig, InMemoryScheduler, ResumableExecutor, ResumableTask, RunOutcome,
    SuspendSignal, TaskControl,
};

const ENV_DEMO_PAGES: &str = "RESUMABLE_DEMO_PAGES";
const PAGES_PER_ATTEMPT: u64 = 25;

#[derive(Debug, thiserror::Error)]
enum SyncError {
    #[error("cursor is not a page number: {0}")]
    BadCursor(serde_json::Value),
}

/// Pulls `total_pages` from an upstream that only allows
/// `PAGES_PER_ATTEMPT` pages per quota window.
struct CatalogSync {
    total_pages: u64,
}

impl ResumableTask for CatalogSync {
    type Error = SyncError;

    fn name(&self) -> &str {
        "catalog-sync"
    }

    fn perform(&self, state: &State, attempt: u32) -> Result<TaskControl, SyncError> {
        let page = match state.get("page") {
            None => 0,
            Some(v) => v.as_u64().ok_or_else(|| SyncError::BadCursor(v.clone()))?,
        };
        let end = (page + PAGES_PER_ATTEMPT).min(self.total_pages);
        info!(attempt, from = page, to = end, "syncing pages");

        if end == self.total_pages {
            return Ok(TaskControl::Complete);
        }

        Ok(SuspendSignal::new("upstream quota exhausted")
            .with_update("page", end)
            .with_update("session", format!("session-{attempt}"))
            .into())
    }

    // Upstream sessions do not outlive a quota window.
    fn filter_state(&self, mut state: State) -> State {
        state.remove("session");
        state
    }
}

fn main() -> anyhow::Result<()> {
    resumable_observability::init();

    let config = ExecutorConfig::from_env();
    let total_pages = match std::env::var(ENV_DEMO_PAGES) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{ENV_DEMO_PAGES}={raw:?}"))?,
        Err(_) => 100,
    };

    let scheduler = InMemoryScheduler::arc();
    let clock = ManualClock::arc(Utc::now());
    let started = clock.now();
    let executor = ResumableExecutor::from_config(&config, scheduler.clone(), clock.clone())?;
    let task = CatalogSync { total_pages };

    if let RunOutcome::Failed(e) = executor.run_task(&task, State::new())? {
        bail!("first attempt failed: {e}");
    }

    while let Some(due) = scheduler.next_due_at() {
        clock.set(due);
        let report = executor.drive_due(&scheduler, &task)?;
        if let Some((entry, e)) = report.rejected.first() {
            bail!("resume {} rejected: {e}", entry.handle);
        }
        if let Some((handle, e)) = report.failed.into_iter().next() {
            bail!("resume {handle} failed: {e}");
        }
    }

    let stats = executor.stats();
    info!(
        executor = executor.name(),
        runs = stats.runs,
        suspended = stats.suspended,
        completed = stats.completed,
        simulated_secs = (clock.now() - started).num_seconds(),
        "catalog sync finished"
    );

    Ok(())
}
