//! Prometheus metrics for the enrollment engine.
//!
//! Components record through the `metrics` facade; this module installs the
//! Prometheus recorder once per process and renders the scrape output for
//! the `/metrics` route.
//!
//! # Example
//!
//! ```rust,no_run
//! use enrollment_runtime::metrics::MetricsExporter;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let exporter = MetricsExporter::install()?;
//! let text = exporter.render();
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Reservations created, labelled by initial `status`
pub const RESERVATIONS_TOTAL: &str = "enrollment_reservations_total";
/// Reservation attempts rejected, labelled by `reason`
pub const RESERVATIONS_REJECTED_TOTAL: &str = "enrollment_reservations_rejected_total";
/// Webhook settlements, labelled by `outcome`
pub const SETTLEMENTS_TOTAL: &str = "enrollment_settlements_total";
/// Refund attempts, labelled by `result`
pub const REFUNDS_TOTAL: &str = "enrollment_refunds_total";
/// Notification deliveries, labelled by `result`
pub const NOTIFICATIONS_TOTAL: &str = "enrollment_notifications_total";
/// Outbox entries created, labelled by `kind`
pub const OUTBOX_ENQUEUED_TOTAL: &str = "enrollment_outbox_enqueued_total";
/// Outbox attempts, labelled by `result`
pub const OUTBOX_ATTEMPTS_TOTAL: &str = "enrollment_outbox_attempts_total";
/// Outbox entries removed by retention cleanup
pub const OUTBOX_CLEANED_TOTAL: &str = "enrollment_outbox_cleaned_total";
/// Entries claimed in the last outbox drain
pub const OUTBOX_LAST_BATCH: &str = "enrollment_outbox_last_batch_size";
/// Reservations reclaimed by the expiry sweep
pub const EXPIRED_TOTAL: &str = "enrollment_expired_reservations_total";
/// Expiry sweep duration
pub const SWEEP_DURATION: &str = "enrollment_sweep_duration_seconds";
/// Gateway call duration, labelled by `operation`
pub const GATEWAY_DURATION: &str = "enrollment_gateway_call_duration_seconds";
/// Scheduled job failures, labelled by `job`
pub const JOB_ERRORS_TOTAL: &str = "enrollment_job_errors_total";

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Installed Prometheus recorder.
#[derive(Clone)]
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

impl MetricsExporter {
    /// Register metric descriptions and install the global recorder.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if a recorder is already installed
    /// in this process.
    pub fn install() -> Result<Self, MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = builder
            .install_recorder()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        tracing::info!("Prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render current metrics in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter").finish_non_exhaustive()
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Reservations
    describe_counter!(RESERVATIONS_TOTAL, "Total number of reservations created");
    describe_counter!(
        RESERVATIONS_REJECTED_TOTAL,
        "Total number of reservation attempts rejected"
    );

    // Settlement
    describe_counter!(SETTLEMENTS_TOTAL, "Total number of processed payment webhooks");
    describe_counter!(REFUNDS_TOTAL, "Total number of overbook refund attempts");
    describe_histogram!(GATEWAY_DURATION, "Time taken by payment gateway calls");

    // Notifications & outbox
    describe_counter!(NOTIFICATIONS_TOTAL, "Total number of notification deliveries");
    describe_counter!(OUTBOX_ENQUEUED_TOTAL, "Total number of outbox entries created");
    describe_counter!(OUTBOX_ATTEMPTS_TOTAL, "Total number of outbox delivery attempts");
    describe_counter!(
        OUTBOX_CLEANED_TOTAL,
        "Total number of outbox entries removed by retention cleanup"
    );
    describe_gauge!(OUTBOX_LAST_BATCH, "Entries claimed by the most recent outbox drain");

    // Expiry
    describe_counter!(EXPIRED_TOTAL, "Total number of reservations expired by the sweep");
    describe_histogram!(SWEEP_DURATION, "Time taken by one expiry sweep");

    // Scheduler
    describe_counter!(JOB_ERRORS_TOTAL, "Total number of failed scheduled job runs");
}
