//! Exponential backoff for suspended tasks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use resumable_core::{Clock, CoreError, CoreResult, SystemClock};

/// Default backoff unit: one minute.
pub const DEFAULT_BASE_UNIT: Duration = Duration::from_secs(60);

/// Backoff policy: `base_unit * 2^attempt`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay for attempt 0
    pub base_unit: Duration,
    /// Optional upper bound on the computed delay
    pub max_delay: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_unit: DEFAULT_BASE_UNIT,
            max_delay: None,
        }
    }
}

impl BackoffPolicy {
    /// Create an uncapped policy with the given base unit.
    pub fn new(base_unit: Duration) -> CoreResult<Self> {
        Self {
            base_unit,
            max_delay: None,
        }
        .validated()
    }

    /// Cap every delay at `max_delay`.
    pub fn with_max_delay(mut self, max_delay: Duration) -> CoreResult<Self> {
        self.max_delay = Some(max_delay);
        self.validated()
    }

    /// Check the policy invariants.
    pub fn validated(self) -> CoreResult<Self> {
        if self.base_unit.is_zero() {
            return Err(CoreError::invalid_argument(
                "backoff base unit must be positive",
            ));
        }
        if let Some(max) = self.max_delay {
            if max < self.base_unit {
                return Err(CoreError::invalid_argument(format!(
                    "backoff max delay ({max:?}) is smaller than base unit ({:?})",
                    self.base_unit
                )));
            }
        }
        Ok(self)
    }

    /// Delay for the given attempt (0-indexed).
    ///
    /// Saturates at `Duration::MAX` (or the cap) instead of wrapping.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = 1u128
            .checked_shl(attempt)
            .and_then(|factor| self.base_unit.as_nanos().checked_mul(factor))
            .and_then(duration_from_nanos)
            .unwrap_or(Duration::MAX);

        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

fn duration_from_nanos(nanos: u128) -> Option<Duration> {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    let subsec = u32::try_from(nanos % NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, subsec))
}

/// Maps an attempt counter to the point in time the next attempt should run.
///
/// Holds only immutable configuration; "now" comes from the injected clock.
#[derive(Debug, Clone)]
pub struct BackoffCalculator<C = SystemClock> {
    policy: BackoffPolicy,
    clock: C,
}

impl BackoffCalculator<SystemClock> {
    /// Wall-clock calculator with the given policy.
    pub fn new(policy: BackoffPolicy) -> Self {
        Self::with_clock(policy, SystemClock)
    }
}

impl Default for BackoffCalculator<SystemClock> {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

impl<C: Clock> BackoffCalculator<C> {
    pub fn with_clock(policy: BackoffPolicy, clock: C) -> Self {
        Self { policy, clock }
    }

    /// Same clock, different policy.
    pub fn with_policy(self, policy: BackoffPolicy) -> Self {
        Self {
            policy,
            clock: self.clock,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// `now + base_unit * 2^attempt`, saturating at the latest representable time.
    pub fn compute(&self, attempt: u32) -> DateTime<Utc> {
        let now = self.clock.now();
        let delay = self.policy.delay_for_attempt(attempt);

        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use proptest::prelude::*;
    use resumable_core::ManualClock;

    fn fixed_calculator() -> (BackoffCalculator<ManualClock>, DateTime<Utc>) {
        let now = Utc::now();
        (
            BackoffCalculator::with_clock(BackoffPolicy::default(), ManualClock::new(now)),
            now,
        )
    }

    #[test]
    fn exponential_minutes_from_now() {
        let (calc, now) = fixed_calculator();

        assert_eq!(calc.compute(0), now + TimeDelta::minutes(1));
        assert_eq!(calc.compute(1), now + TimeDelta::minutes(2));
        assert_eq!(calc.compute(3), now + TimeDelta::minutes(8));
    }

    #[test]
    fn custom_base_unit() {
        let policy = BackoffPolicy::new(Duration::from_millis(100)).unwrap();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }

    #[test]
    fn large_attempts_stay_exact() {
        let millis = BackoffPolicy::new(Duration::from_millis(1)).unwrap();
        assert_eq!(millis.delay_for_attempt(32), Duration::from_millis(1 << 32));

        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(32), Duration::from_secs(60 << 32));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(60 << 40));
        assert_eq!(policy.delay_for_attempt(58), Duration::from_secs(60 << 58));

        let (calc, now) = fixed_calculator();
        assert_eq!(calc.compute(32), now + TimeDelta::minutes(1 << 32));
    }

    #[test]
    fn overflowing_attempts_saturate() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(59), Duration::MAX);
        assert_eq!(policy.delay_for_attempt(128), Duration::MAX);
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::MAX);

        // Representable as a delay but not as a calendar date.
        let (calc, _) = fixed_calculator();
        assert_eq!(calc.compute(40), DateTime::<Utc>::MAX_UTC);
        assert_eq!(calc.compute(u32::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn max_delay_caps_growth() {
        let policy = BackoffPolicy::default()
            .with_max_delay(Duration::from_secs(10 * 60))
            .unwrap();

        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8 * 60));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(10 * 60));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_secs(10 * 60));
    }

    #[test]
    fn zero_base_unit_is_rejected() {
        let err = BackoffPolicy::new(Duration::ZERO).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn cap_below_base_is_rejected() {
        let err = BackoffPolicy::default()
            .with_max_delay(Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
    }

    #[test]
    fn calculator_follows_clock() {
        let start = Utc::now();
        let clock = ManualClock::arc(start);
        let calc = BackoffCalculator::with_clock(BackoffPolicy::default(), clock.clone());

        clock.advance(TimeDelta::hours(1));
        assert_eq!(calc.compute(0), start + TimeDelta::hours(1) + TimeDelta::minutes(1));
    }

    proptest! {
        /// Delay never shrinks as the attempt counter grows.
        #[test]
        fn delay_is_monotonic(attempt in 0u32..200, base_ms in 1u64..120_000) {
            let policy = BackoffPolicy::new(Duration::from_millis(base_ms)).unwrap();
            prop_assert!(
                policy.delay_for_attempt(attempt) <= policy.delay_for_attempt(attempt + 1)
            );
        }

        /// Before saturation, each attempt doubles the delay exactly.
        #[test]
        fn delay_doubles_until_saturation(attempt in 0u32..40, base_ms in 1u64..120_000) {
            let policy = BackoffPolicy::new(Duration::from_millis(base_ms)).unwrap();
            prop_assert_eq!(
                policy.delay_for_attempt(attempt + 1),
                policy.delay_for_attempt(attempt) * 2
            );
        }
    }
}
