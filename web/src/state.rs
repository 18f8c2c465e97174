//! Application state for Axum handlers.

use enrollment_core::store::StoreHealth;
use enrollment_runtime::ReservationEngine;
use enrollment_runtime::metrics::MetricsExporter;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Reservation and settlement operations
    pub engine: Arc<ReservationEngine>,
    /// Backing store probe for `/ready`
    pub health: Arc<dyn StoreHealth>,
    /// Prometheus exporter for `/metrics`, absent when no recorder is installed
    pub metrics: Option<MetricsExporter>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(engine: Arc<ReservationEngine>, health: Arc<dyn StoreHealth>) -> Self {
        Self {
            engine,
            health,
            metrics: None,
        }
    }

    /// Serve `/metrics` from `exporter`.
    #[must_use]
    pub fn with_metrics(mut self, exporter: MetricsExporter) -> Self {
        self.metrics = Some(exporter);
        self
    }
}
