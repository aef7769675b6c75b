//! State filters applied before a suspended task's state leaves the process.
//!
//! A filter runs once per suspend cycle, after the signal's update has been
//! merged and before the attempt counter is re-applied. It can only return a
//! new [`State`], so it has no way to request suspension itself; a panic
//! inside a filter propagates to the caller.

use resumable_core::State;

/// Narrows or transforms state before it is handed to the scheduler.
pub trait StateFilter: Send + Sync {
    fn filter(&self, state: State) -> State;
}

/// Passes state through untouched.
#[derive(Debug, Default, Copy, Clone)]
pub struct IdentityFilter;

impl StateFilter for IdentityFilter {
    fn filter(&self, state: State) -> State {
        state
    }
}

/// Removes a fixed set of keys (secrets, handles, anything the backend
/// cannot serialize).
#[derive(Debug, Clone, Default)]
pub struct DropKeys {
    keys: Vec<String>,
}

impl DropKeys {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl StateFilter for DropKeys {
    fn filter(&self, mut state: State) -> State {
        for key in &self.keys {
            state.remove(key);
        }
        state
    }
}

/// Filter backed by a closure. See [`filter_fn`].
#[derive(Clone)]
pub struct FnFilter<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnFilter").finish_non_exhaustive()
    }
}

impl<F> StateFilter for FnFilter<F>
where
    F: Fn(State) -> State + Send + Sync,
{
    fn filter(&self, state: State) -> State {
        (self.f)(state)
    }
}

/// Wrap a closure as a [`StateFilter`].
pub fn filter_fn<F>(f: F) -> FnFilter<F>
where
    F: Fn(State) -> State + Send + Sync,
{
    FnFilter { f }
}

impl<T: StateFilter + ?Sized> StateFilter for Box<T> {
    fn filter(&self, state: State) -> State {
        (**self).filter(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> State {
        State::from_value(json!({"page": 3, "token": "secret", "attempt": 1})).unwrap()
    }

    #[test]
    fn identity_is_idempotent() {
        let once = IdentityFilter.filter(sample());
        let twice = IdentityFilter.filter(IdentityFilter.filter(sample()));
        assert_eq!(once, sample());
        assert_eq!(once, twice);
    }

    #[test]
    fn drop_keys_removes_only_named_keys() {
        let filtered = DropKeys::new(["token", "missing"]).filter(sample());
        assert_eq!(
            filtered,
            State::from_value(json!({"page": 3, "attempt": 1})).unwrap()
        );
    }

    #[test]
    fn closure_filters() {
        let only_page = filter_fn(|state: State| {
            state
                .into_iter()
                .filter(|(k, _)| k == "page")
                .collect::<State>()
        });

        assert_eq!(
            only_page.filter(sample()),
            State::from_value(json!({"page": 3})).unwrap()
        );
    }
}
