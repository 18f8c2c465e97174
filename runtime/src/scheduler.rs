//! Periodic background jobs.
//!
//! One tokio task per job, each driven by its own interval with missed ticks
//! skipped, all stopped by a shared broadcast shutdown signal.
//!
//! # Example
//!
//! ```rust,ignore
//! let scheduler = Scheduler::start(sweeper, outbox, &SchedulerConfig::default());
//! // ... serve traffic ...
//! scheduler.shutdown(Duration::from_secs(10)).await;
//! ```

use crate::expiry::ExpirySweeper;
use crate::metrics::JOB_ERRORS_TOTAL;
use crate::outbox::OutboxProcessor;
use enrollment_core::StoreResult;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Job intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Expiry sweep interval
    pub expiry_interval: Duration,
    /// Outbox retry drain interval
    pub outbox_retry_interval: Duration,
    /// Outbox retention cleanup interval
    pub outbox_cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_interval: Duration::from_secs(60),
            outbox_retry_interval: Duration::from_secs(60),
            outbox_cleanup_interval: Duration::from_secs(3600),
        }
    }
}

/// Running background jobs.
pub struct Scheduler {
    shutdown_tx: broadcast::Sender<()>,
    jobs: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Spawn the expiry sweep, outbox retry and outbox cleanup loops.
    #[must_use]
    pub fn start(
        sweeper: Arc<ExpirySweeper>,
        outbox: Arc<OutboxProcessor>,
        config: &SchedulerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut scheduler = Self {
            shutdown_tx,
            jobs: Vec::new(),
        };

        scheduler.spawn("expiry_sweep", config.expiry_interval, move || {
            let sweeper = Arc::clone(&sweeper);
            async move { sweeper.sweep().await.map(|_| ()) }
        });

        let retry = Arc::clone(&outbox);
        scheduler.spawn("outbox_retry", config.outbox_retry_interval, move || {
            let outbox = Arc::clone(&retry);
            async move { outbox.process_due().await.map(|_| ()) }
        });

        scheduler.spawn(
            "outbox_cleanup",
            config.outbox_cleanup_interval,
            move || {
                let outbox = Arc::clone(&outbox);
                async move { outbox.cleanup().await.map(|_| ()) }
            },
        );

        tracing::info!(jobs = scheduler.jobs.len(), "Scheduler started");
        scheduler
    }

    /// Spawn one periodic job.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, period: Duration, job: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<()>> + Send + 'static,
    {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = period.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = job().await {
                            metrics::counter!(JOB_ERRORS_TOTAL, "job" => name).increment(1);
                            tracing::error!(job = name, error = %e, "Scheduled job failed");
                        }
                    }
                }
            }

            tracing::debug!(job = name, "Scheduled job stopped");
        });

        self.jobs.push((name, handle));
    }

    /// Signal every job to stop and wait for each up to `timeout`.
    ///
    /// A job mid-run finishes its current iteration first.
    pub async fn shutdown(self, timeout: Duration) {
        let _ = self.shutdown_tx.send(());

        for (name, handle) in self.jobs {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => tracing::info!(job = name, "Job stopped gracefully"),
                Ok(Err(e)) => tracing::warn!(job = name, error = %e, "Job task failed"),
                Err(_) => tracing::warn!(job = name, "Job shutdown timed out"),
            }
        }
    }
}
