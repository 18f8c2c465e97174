//! Integration tests for the expiry sweep and the scheduler.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

mod common;

use chrono::Duration as ChronoDuration;
use common::Harness;
use enrollment_core::store::InventoryStore;
use enrollment_core::types::{GatewayStatus, PaymentStatus};
use enrollment_runtime::{Scheduler, SchedulerConfig};
use enrollment_testing::fixtures::paid_event;
use std::sync::Arc;
use std::time::Duration;

const FIVE_MINUTES: Duration = Duration::from_secs(300);

#[tokio::test]
async fn stale_pending_reservation_expires_and_returns_its_slot() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    // Two slots already taken by other attendees.
    h.store.decrement_if_available(event.id).await.unwrap();
    h.store.decrement_if_available(event.id).await.unwrap();
    let number = h.pending(&event, "a@example.com").await;

    h.clock.advance(ChronoDuration::minutes(6));
    let expired = h.sweeper(FIVE_MINUTES, 100).sweep().await.unwrap();

    assert_eq!(expired, 1);
    assert_eq!(
        h.store.reservation(&number).await.unwrap().payment_status,
        PaymentStatus::Expired
    );
    assert_eq!(h.slots(&event).await, 4);
}

#[tokio::test]
async fn restored_slots_never_exceed_capacity() {
    let h = Harness::new();
    let event = h.seed(paid_event(2, 2500)).await;
    h.pending(&event, "a@example.com").await;
    h.pending(&event, "b@example.com").await;
    h.pending(&event, "c@example.com").await;

    h.clock.advance(ChronoDuration::minutes(6));
    let expired = h.sweeper(FIVE_MINUTES, 100).sweep().await.unwrap();

    assert_eq!(expired, 3);
    assert_eq!(h.slots(&event).await, 2);
}

#[tokio::test]
async fn young_and_settled_reservations_are_left_alone() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let confirmed = h.pending(&event, "paid@example.com").await;
    h.settle(&confirmed, GatewayStatus::Confirmed, "pi_1").await;

    h.clock.advance(ChronoDuration::minutes(6));
    let young = h.pending(&event, "young@example.com").await;
    let expired = h.sweeper(FIVE_MINUTES, 100).sweep().await.unwrap();

    assert_eq!(expired, 0);
    assert_eq!(
        h.store.reservation(&confirmed).await.unwrap().payment_status,
        PaymentStatus::Confirmed
    );
    assert_eq!(
        h.store.reservation(&young).await.unwrap().payment_status,
        PaymentStatus::PendingPayment
    );
    assert_eq!(h.slots(&event).await, 4);
}

#[tokio::test]
async fn sweep_is_bounded_by_batch_size() {
    let h = Harness::new();
    let event = h.seed(paid_event(10, 2500)).await;
    for i in 0..5 {
        h.pending(&event, &format!("user{i}@example.com")).await;
        h.clock.advance(ChronoDuration::seconds(1));
    }

    h.clock.advance(ChronoDuration::minutes(6));
    let sweeper = h.sweeper(FIVE_MINUTES, 2);

    assert_eq!(sweeper.sweep().await.unwrap(), 2);
    assert_eq!(sweeper.sweep().await.unwrap(), 2);
    assert_eq!(sweeper.sweep().await.unwrap(), 1);
    assert_eq!(sweeper.sweep().await.unwrap(), 0);
}

#[tokio::test]
async fn late_webhook_after_expiry_is_ignored() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    let number = h.pending(&event, "a@example.com").await;

    h.clock.advance(ChronoDuration::minutes(6));
    h.sweeper(FIVE_MINUTES, 100).sweep().await.unwrap();
    h.settle(&number, GatewayStatus::Confirmed, "pi_late").await;

    assert_eq!(
        h.store.reservation(&number).await.unwrap().payment_status,
        PaymentStatus::Expired
    );
    assert_eq!(h.slots(&event).await, 5);
}

#[tokio::test]
async fn scheduler_runs_jobs_until_shutdown() {
    let h = Harness::new();
    let event = h.seed(paid_event(5, 2500)).await;
    h.store.decrement_if_available(event.id).await.unwrap();
    let number = h.pending(&event, "a@example.com").await;
    h.clock.advance(ChronoDuration::minutes(6));

    let scheduler = Scheduler::start(
        Arc::new(h.sweeper(FIVE_MINUTES, 100)),
        Arc::clone(&h.outbox),
        &SchedulerConfig {
            expiry_interval: Duration::from_millis(10),
            outbox_retry_interval: Duration::from_millis(10),
            outbox_cleanup_interval: Duration::from_millis(10),
        },
    );

    let mut expired = false;
    for _ in 0..100 {
        if h.store.reservation(&number).await.unwrap().payment_status == PaymentStatus::Expired {
            expired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    scheduler.shutdown(Duration::from_secs(5)).await;

    assert!(expired);
    assert_eq!(h.slots(&event).await, 5);
}
