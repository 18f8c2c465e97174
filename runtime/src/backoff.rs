//! Exponential backoff schedule for outbox retries.
//!
//! Attempt numbers are 1-based: the failed immediate send that creates an
//! outbox entry is attempt 1, so the first retry waits `initial_delay`.
//!
//! # Example
//!
//! ```rust
//! use enrollment_runtime::backoff::BackoffPolicy;
//! use std::time::Duration;
//!
//! let policy = BackoffPolicy::builder()
//!     .initial_delay(Duration::from_secs(60))
//!     .multiplier(2.0)
//!     .max_delay(Duration::from_secs(3600))
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
//! assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(240));
//! assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(3600));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff schedule configuration.
///
/// # Default Values
///
/// - `initial_delay`: 1 minute
/// - `max_delay`: 1 hour
/// - `multiplier`: 2.0 (delay doubles each attempt)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Cap for the exponential growth
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
            multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> BackoffPolicyBuilder {
        BackoffPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Delay before the attempt following failed attempt number `attempt`.
    ///
    /// `initial_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    /// Attempt `0` is treated as attempt `1`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay_ms = self.initial_delay.as_millis() as f64 * factor;

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }

    /// Next attempt time after failed attempt number `attempt`.
    ///
    /// Never earlier than `previous`, so a per-entry schedule is
    /// non-decreasing even if the clock or the policy moves backwards.
    #[must_use]
    pub fn next_attempt_time(
        &self,
        previous: DateTime<Utc>,
        now: DateTime<Utc>,
        attempt: u32,
    ) -> DateTime<Utc> {
        previous.max(add_duration(now, self.delay_for_attempt(attempt)))
    }
}

/// Builder for [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct BackoffPolicyBuilder {
    policy: BackoffPolicy,
}

impl BackoffPolicyBuilder {
    /// Set the delay after the first failed attempt.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set the growth factor.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Build the [`BackoffPolicy`].
    #[must_use]
    pub const fn build(self) -> BackoffPolicy {
        self.policy
    }
}

/// `at + delay`, saturating at the largest representable time
#[must_use]
pub fn add_duration(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `at - delay`, saturating at the smallest representable time
#[must_use]
pub fn sub_duration(at: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|d| at.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn default_schedule_doubles_from_one_minute() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(120));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(240));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(480));
    }

    #[test]
    fn delay_is_capped() {
        let policy = BackoffPolicy::builder()
            .initial_delay(Duration::from_secs(1))
            .multiplier(10.0)
            .max_delay(Duration::from_secs(5))
            .build();

        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn next_attempt_never_moves_backwards() {
        let policy = BackoffPolicy::default();
        let far_future = t0() + chrono::Duration::days(1);

        assert_eq!(policy.next_attempt_time(far_future, t0(), 1), far_future);
        assert_eq!(
            policy.next_attempt_time(t0(), t0(), 2),
            t0() + chrono::Duration::minutes(2)
        );
    }

    #[test]
    fn saturating_time_arithmetic() {
        assert_eq!(
            add_duration(DateTime::<Utc>::MAX_UTC, Duration::from_secs(1)),
            DateTime::<Utc>::MAX_UTC
        );
        assert_eq!(
            sub_duration(t0(), Duration::from_secs(60)),
            t0() - chrono::Duration::minutes(1)
        );
    }

    proptest! {
        #[test]
        fn delays_are_non_decreasing_and_bounded(
            initial_ms in 1u64..120_000,
            multiplier in 1.0f64..5.0,
            max_ms in 1u64..7_200_000,
            attempt in 1u32..64,
        ) {
            let policy = BackoffPolicy::builder()
                .initial_delay(Duration::from_millis(initial_ms))
                .multiplier(multiplier)
                .max_delay(Duration::from_millis(max_ms))
                .build();

            let current = policy.delay_for_attempt(attempt);
            let next = policy.delay_for_attempt(attempt + 1);
            prop_assert!(next >= current);
            prop_assert!(next <= policy.max_delay);
        }

        #[test]
        fn schedule_is_monotonic_per_entry(
            steps in proptest::collection::vec(0i64..10_000, 1..12),
        ) {
            let policy = BackoffPolicy::default();
            let mut now = t0();
            let mut next = add_duration(now, policy.initial_delay);

            for (i, step) in steps.iter().enumerate() {
                now += chrono::Duration::seconds(*step);
                let attempt = u32::try_from(i).unwrap() + 2;
                let updated = policy.next_attempt_time(next, now, attempt);
                prop_assert!(updated >= next);
                next = updated;
            }
        }
    }
}
