//! Application wiring and lifecycle.
//!
//! [`Application::build`] connects the database, runs migrations and
//! assembles the engine, its background jobs and the HTTP router.
//! [`Application::run`] serves until Ctrl+C or SIGTERM, then stops the
//! scheduler and drains the notifier.

use crate::config::Config;
use anyhow::Context;
use enrollment_core::environment::{Clock, SystemClock};
use enrollment_core::gateway::PaymentGateway;
use enrollment_core::notification::NotificationSender;
use enrollment_postgres::PostgresStore;
use enrollment_providers::{ConsoleNotificationSender, SmtpNotificationSender, StripeGateway};
use enrollment_runtime::metrics::MetricsExporter;
use enrollment_runtime::{
    EnginePorts, ExpirySweeper, Notifier, OutboxProcessor, ReservationEngine, Scheduler,
};
use enrollment_web::AppState;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};

/// Fully wired application, ready to serve.
pub struct Application {
    listener: tokio::net::TcpListener,
    router: axum::Router,
    scheduler: Scheduler,
    notifier: Arc<Notifier>,
    config: Config,
}

impl Application {
    /// Connect to the database and wire every component.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable, a migration fails,
    /// a provider cannot be configured or the listener cannot bind.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        info!(
            max_connections = config.database.max_connections,
            "Connecting to PostgreSQL"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .acquire_timeout(config.database.connect_timeout)
            .idle_timeout(config.database.idle_timeout)
            .connect(&config.database.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = Arc::new(PostgresStore::new(pool));
        store.migrate().await.context("Failed to run migrations")?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            StripeGateway::with_clock(config.stripe.clone(), Arc::clone(&clock))
                .context("Failed to build Stripe gateway")?,
        );
        let sender: Arc<dyn NotificationSender> = if let Some(smtp) = &config.smtp {
            info!(host = %smtp.host, port = smtp.port, "Delivering notifications over SMTP");
            Arc::new(SmtpNotificationSender::new(smtp.clone()).context("Invalid SMTP settings")?)
        } else {
            warn!("SMTP_HOST not set, notifications will be logged to the console");
            Arc::new(ConsoleNotificationSender)
        };

        let outbox = Arc::new(OutboxProcessor::new(
            store.clone(),
            Arc::clone(&sender),
            Arc::clone(&gateway),
            Arc::clone(&clock),
            config.outbox_config(),
        ));
        let notifier = Arc::new(Notifier::from_config(
            sender,
            Arc::clone(&outbox),
            &config.notifier_config(),
        ));
        let engine = Arc::new(ReservationEngine::new(
            EnginePorts {
                catalog: store.clone(),
                inventory: store.clone(),
                reservations: store.clone(),
                gateway,
                clock: Arc::clone(&clock),
            },
            Arc::clone(&notifier),
            Arc::clone(&outbox),
            config.engine_config(),
        ));

        let sweeper = Arc::new(ExpirySweeper::new(
            store.clone(),
            clock,
            config.expiry_config(),
        ));
        let scheduler = Scheduler::start(sweeper, outbox, &config.scheduler_config());

        let mut state = AppState::new(engine, store);
        match MetricsExporter::install() {
            Ok(exporter) => state = state.with_metrics(exporter),
            Err(e) => warn!(error = %e, "Metrics exporter unavailable, /metrics disabled"),
        }
        let router = enrollment_web::router(state);

        let address = config.bind_address();
        let listener = tokio::net::TcpListener::bind(&address)
            .await
            .with_context(|| format!("Failed to bind {address}"))?;

        Ok(Self {
            listener,
            router,
            scheduler,
            notifier,
            config,
        })
    }

    /// Serve until a shutdown signal, then stop background work.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP server fails.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(address = %self.config.bind_address(), "HTTP server listening");

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server failed")?;

        info!("HTTP server stopped, initiating graceful shutdown...");
        let timeout = self.config.server.shutdown_timeout;
        self.scheduler.shutdown(timeout).await;
        self.notifier.shutdown(timeout).await;

        info!("Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires, so the
/// other signal still triggers shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
