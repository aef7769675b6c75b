//! Strongly-typed identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Handle returned by a scheduler for an accepted resume request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(Uuid);

impl JobHandle {
    /// Create a new handle.
    ///
    /// Uses UUIDv7 (time-ordered), so handles sort by creation time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for JobHandle {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<JobHandle> for Uuid {
    fn from(value: JobHandle) -> Self {
        value.0
    }
}

impl FromStr for JobHandle {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| CoreError::invalid_id(format!("JobHandle: {e}")))?;
        Ok(Self(uuid))
    }
}
