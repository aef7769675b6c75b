//! `resumable-core` — building blocks shared by the resumable job runtime.
//!
//! This crate contains **pure** primitives (no scheduling or backend concerns).

pub mod clock;
pub mod error;
pub mod id;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use id::JobHandle;
pub use state::{ATTEMPT_KEY, State};
