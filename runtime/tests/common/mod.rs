//! Shared wiring for runtime integration tests.

#![allow(dead_code, clippy::expect_used)]

use enrollment_core::types::{Event, GatewayStatus, ReservationNumber};
use enrollment_runtime::{
    EngineConfig, EnginePorts, ExpiryConfig, ExpirySweeper, Notifier, OutboxConfig,
    OutboxProcessor, ReservationEngine, SettlementOutcome,
};
use enrollment_testing::{
    InMemoryStore, ManualClock, MockNotificationSender, MockPaymentGateway, manual_clock,
};
use std::sync::Arc;
use std::time::Duration;

/// Engine, outbox and sweeper over in-memory doubles sharing one manual clock.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub sender: Arc<MockNotificationSender>,
    pub clock: Arc<ManualClock>,
    pub outbox: Arc<OutboxProcessor>,
    pub engine: Arc<ReservationEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default(), OutboxConfig::default())
    }

    pub fn with_config(engine_config: EngineConfig, outbox_config: OutboxConfig) -> Self {
        enrollment_testing::init_test_tracing();

        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(MockPaymentGateway::new());
        let sender = Arc::new(MockNotificationSender::new());
        let clock = Arc::new(manual_clock());

        let outbox = Arc::new(OutboxProcessor::new(
            store.clone(),
            sender.clone(),
            gateway.clone(),
            clock.clone(),
            outbox_config.clone(),
        ));
        let notifier = Arc::new(Notifier::inline(
            sender.clone(),
            Arc::clone(&outbox),
            outbox_config.send_timeout,
        ));
        let ports = EnginePorts {
            catalog: store.clone(),
            inventory: store.clone(),
            reservations: store.clone(),
            gateway: gateway.clone(),
            clock: clock.clone(),
        };
        let engine = Arc::new(ReservationEngine::new(
            ports,
            notifier,
            Arc::clone(&outbox),
            engine_config,
        ));

        Self {
            store,
            gateway,
            sender,
            clock,
            outbox,
            engine,
        }
    }

    pub fn sweeper(&self, pending_expiry: Duration, batch_size: u32) -> ExpirySweeper {
        ExpirySweeper::new(
            self.store.clone(),
            self.clock.clone(),
            ExpiryConfig {
                pending_expiry,
                batch_size,
            },
        )
    }

    pub async fn seed(&self, event: Event) -> Event {
        self.store.add_event(event.clone()).await;
        event
    }

    pub async fn slots(&self, event: &Event) -> u32 {
        self.store
            .event(event.id)
            .await
            .map(|e| e.available_slots)
            .unwrap_or_default()
    }

    /// Create a paid reservation and return its number
    pub async fn pending(&self, event: &Event, email: &str) -> ReservationNumber {
        self.engine
            .create_reservation(event.id, email, "Test", "Attendee")
            .await
            .expect("paid reservation")
            .reservation_number
    }

    pub async fn settle(
        &self,
        number: &ReservationNumber,
        status: GatewayStatus,
        reference: &str,
    ) -> SettlementOutcome {
        self.engine
            .settle_payment(number, status, reference)
            .await
            .expect("settlement")
    }
}
