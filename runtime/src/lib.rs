//! # Enrollment Runtime
//!
//! The imperative shell around the enrollment domain.
//!
//! ## Core Components
//!
//! - **[`ReservationEngine`]**: race-free slot allocation and idempotent
//!   webhook settlement, including overbook compensation
//! - **[`Notifier`]**: after-commit delivery with outbox fallback
//! - **[`OutboxProcessor`]**: backoff-retried, self-cleaning delivery queue
//! - **[`ExpirySweeper`]**: reclaims slots from abandoned checkouts
//! - **[`Scheduler`]**: owns the periodic loops and their shutdown
//!
//! ## Example
//!
//! ```ignore
//! use enrollment_runtime::*;
//!
//! let outbox = Arc::new(OutboxProcessor::new(store, sender, gateway, clock, OutboxConfig::default()));
//! let notifier = Arc::new(Notifier::from_config(sender, Arc::clone(&outbox), &NotifierConfig::default()));
//! let engine = ReservationEngine::new(ports, notifier, Arc::clone(&outbox), EngineConfig::default());
//!
//! let receipt = engine.create_reservation(event_id, "ada@example.com", "Ada", "Lovelace").await?;
//! ```

/// Exponential backoff schedule
pub mod backoff;

/// Slot allocation and settlement
pub mod engine;

/// Stale reservation sweep
pub mod expiry;

/// Prometheus metrics for observability
pub mod metrics;

/// After-commit notification dispatch
pub mod notifier;

/// Notification outbox processing
pub mod outbox;

/// Periodic job loops
pub mod scheduler;

pub use backoff::BackoffPolicy;
pub use engine::{EngineConfig, EnginePorts, IgnoreReason, ReservationEngine, SettlementOutcome};
pub use expiry::{ExpiryConfig, ExpirySweeper};
pub use notifier::{Notifier, NotifierConfig};
pub use outbox::{DrainReport, OutboxConfig, OutboxProcessor};
pub use scheduler::{Scheduler, SchedulerConfig};
