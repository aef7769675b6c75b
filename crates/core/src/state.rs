//! Resumable task state.
//!
//! A [`State`] is a flat mapping of string keys to JSON values. It is the only
//! thing that survives between two attempts of the same logical task, so it
//! must stay representable by whatever format the scheduler backend uses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

/// Key holding the attempt counter.
pub const ATTEMPT_KEY: &str = "attempt";

/// Snapshot of a task's resumable progress.
///
/// Values are immutable from the caller's point of view: merge and attempt
/// helpers return a new `State` instead of touching the receiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Map<String, Value>);

impl State {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a state from an arbitrary JSON value.
    ///
    /// Only JSON objects are accepted.
    pub fn from_value(value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CoreError::invalid_argument(format!(
                "state must be a JSON object, got {other}"
            ))),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Shallow, right-biased merge: keys present in `update` win.
    ///
    /// Nested objects are replaced wholesale, never merged recursively.
    pub fn merged(&self, update: &State) -> State {
        let mut merged = self.0.clone();
        for (key, value) in &update.0 {
            merged.insert(key.clone(), value.clone());
        }
        State(merged)
    }

    /// Current attempt counter (`0` when the key is absent).
    ///
    /// Anything other than a non-negative integer that fits in `u32` is
    /// rejected.
    pub fn attempt(&self) -> CoreResult<u32> {
        let Some(raw) = self.0.get(ATTEMPT_KEY) else {
            return Ok(0);
        };

        match raw {
            Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    u32::try_from(v).map_err(|_| {
                        CoreError::invalid_argument(format!("attempt out of range: {v}"))
                    })
                } else if n.as_i64().is_some() {
                    Err(CoreError::invalid_argument(format!(
                        "attempt must be non-negative, got {n}"
                    )))
                } else {
                    Err(CoreError::invalid_argument(format!(
                        "attempt must be an integer, got {n}"
                    )))
                }
            }
            other => Err(CoreError::invalid_argument(format!(
                "attempt must be an integer, got {other}"
            ))),
        }
    }

    /// Copy of this state with the attempt counter set to `attempt`.
    pub fn with_attempt(&self, attempt: u32) -> State {
        self.clone().with(ATTEMPT_KEY, attempt)
    }
}

impl From<Map<String, Value>> for State {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl From<State> for Value {
    fn from(value: State) -> Self {
        value.into_value()
    }
}

impl TryFrom<Value> for State {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for State {
    type Item = (String, Value);
    type IntoIter = serde_json::map::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
