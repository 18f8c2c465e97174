//! # Enrollment Testing
//!
//! Deterministic test doubles for the enrollment engine.
//!
//! This crate provides:
//! - [`InMemoryStore`]: every storage port over one process-local map
//! - [`FixedClock`] and [`ManualClock`]: deterministic time
//! - [`MockPaymentGateway`]: records checkouts and refunds, scriptable failures
//! - [`MockNotificationSender`]: records deliveries, scriptable failures
//!
//! ## Example
//!
//! ```
//! use enrollment_testing::{InMemoryStore, fixtures};
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStore::new();
//! let event = fixtures::free_event(3);
//! store.add_event(event.clone()).await;
//! assert_eq!(store.event(event.id).await.map(|e| e.available_slots), Some(3));
//! # });
//! ```

use chrono::{DateTime, Utc};
use enrollment_core::environment::Clock;

mod gateway;
mod notification;
mod store;

pub use gateway::{MOCK_WEBHOOK_SIGNATURE, MockPaymentGateway};
pub use notification::MockNotificationSender;
pub use store::InMemoryStore;

/// Mock implementations of the clock.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use enrollment_testing::mocks::FixedClock;
    /// use enrollment_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Shared through an `Arc`, it lets a test create a reservation, jump
    /// past the expiry cutoff or an outbox backoff, and run a sweep.
    #[derive(Debug)]
    pub struct ManualClock {
        micros: AtomicI64,
    }

    impl ManualClock {
        /// Start at the given time
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                micros: AtomicI64::new(start.timestamp_micros()),
            }
        }

        /// Move forward by `by`
        pub fn advance(&self, by: chrono::Duration) {
            let micros = by.num_microseconds().unwrap_or(i64::MAX);
            self.micros.fetch_add(micros, Ordering::SeqCst);
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            self.micros.store(to.timestamp_micros(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst)).unwrap_or_default()
        }
    }

    /// The instant every test clock starts at (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    /// Create a manual clock starting at 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn manual_clock() -> ManualClock {
        ManualClock::new(epoch())
    }
}

/// Event builders for tests.
pub mod fixtures {
    use enrollment_core::types::{Event, EventId, Money};

    /// A free event with `capacity` open slots
    #[must_use]
    pub fn free_event(capacity: u32) -> Event {
        Event {
            id: EventId::new(),
            title: "Community Meetup".to_string(),
            price: Money::ZERO,
            image_url: None,
            total_capacity: capacity,
            available_slots: capacity,
        }
    }

    /// A paid event with `capacity` open slots
    #[must_use]
    pub fn paid_event(capacity: u32, price_cents: u64) -> Event {
        Event {
            id: EventId::new(),
            title: "Rust Workshop".to_string(),
            price: Money::from_cents(price_cents),
            image_url: Some("https://cdn.example.com/workshop.png".to_string()),
            total_capacity: capacity,
            available_slots: capacity,
        }
    }
}

/// Install a `tracing` subscriber for test output (idempotent).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, epoch, manual_clock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), epoch());
    }

    #[test]
    fn manual_clock_advances() {
        let clock = manual_clock();
        clock.advance(chrono::Duration::minutes(6));
        assert_eq!(clock.now(), epoch() + chrono::Duration::minutes(6));

        clock.set(epoch());
        assert_eq!(clock.now(), epoch());
    }
}
