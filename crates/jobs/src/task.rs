use resumable_core::State;

use crate::filter::StateFilter;
use crate::signal::TaskControl;

/// A resumable unit of work.
///
/// Re-entry contract: whatever backend accepted a resume request must call
/// [`perform`](ResumableTask::perform) on the same task again, passing the
/// scheduled state as the *full* input. Nothing else survives between
/// attempts.
pub trait ResumableTask: Send + Sync {
    /// Error for genuine failures. Suspension is never an error.
    type Error;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run one attempt against `state`.
    ///
    /// `attempt` is the counter read from `state` (0 on the first run).
    fn perform(&self, state: &State, attempt: u32) -> Result<TaskControl, Self::Error>;

    /// Narrow state before it is handed to the scheduler.
    ///
    /// Runs after the suspend update has been merged. The attempt counter is
    /// re-applied afterwards, so changing it here has no effect.
    fn filter_state(&self, state: State) -> State {
        state
    }
}

/// Adapts a task's `filter_state` hook to [`StateFilter`].
pub(crate) struct TaskFilter<'a, T: ?Sized>(pub(crate) &'a T);

impl<T: ResumableTask + ?Sized> StateFilter for TaskFilter<'_, T> {
    fn filter(&self, state: State) -> State {
        self.0.filter_state(state)
    }
}
