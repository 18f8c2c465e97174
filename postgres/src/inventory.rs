//! Event catalog reads and the slot counter.

use crate::{PostgresStore, map_db_error, to_i32, to_u32};
use async_trait::async_trait;
use enrollment_core::StoreResult;
use enrollment_core::store::{EventCatalog, InventoryStore};
use enrollment_core::types::{Event, EventId, Money};
use sqlx::Row;
use sqlx::postgres::PgRow;

impl PostgresStore {
    /// Insert or replace an event row.
    ///
    /// Events are owned by the catalog; this is used for seeding and tests.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`](enrollment_core::StoreError) if the write fails.
    pub async fn upsert_event(&self, event: &Event) -> StoreResult<()> {
        let price = i64::try_from(event.price.cents()).unwrap_or(i64::MAX);

        sqlx::query(
            r"
            INSERT INTO events (id, title, price_cents, image_url, total_capacity, available_slots)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                price_cents = EXCLUDED.price_cents,
                image_url = EXCLUDED.image_url,
                total_capacity = EXCLUDED.total_capacity,
                available_slots = EXCLUDED.available_slots
            ",
        )
        .bind(event.id.as_uuid())
        .bind(&event.title)
        .bind(price)
        .bind(&event.image_url)
        .bind(to_i32(event.total_capacity))
        .bind(to_i32(event.available_slots))
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }
}

fn row_to_event(row: &PgRow) -> StoreResult<Event> {
    let price: i64 = row.get("price_cents");

    Ok(Event {
        id: EventId::from_uuid(row.get("id")),
        title: row.get("title"),
        price: Money::from_cents(u64::try_from(price).unwrap_or_default()),
        image_url: row.get("image_url"),
        total_capacity: to_u32(row.get("total_capacity"), "total_capacity")?,
        available_slots: to_u32(row.get("available_slots"), "available_slots")?,
    })
}

#[async_trait]
impl EventCatalog for PostgresStore {
    async fn find_event(&self, event_id: EventId) -> StoreResult<Option<Event>> {
        let row = sqlx::query(
            r"
            SELECT id, title, price_cents, image_url, total_capacity, available_slots
            FROM events
            WHERE id = $1
            ",
        )
        .bind(event_id.as_uuid())
        .fetch_optional(self.pool())
        .await
        .map_err(map_db_error)?;

        row.as_ref().map(row_to_event).transpose()
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    async fn decrement_if_available(&self, event_id: EventId) -> StoreResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE events
            SET available_slots = available_slots - 1
            WHERE id = $1 AND available_slots > 0
            ",
        )
        .bind(event_id.as_uuid())
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected())
    }

    async fn restore(&self, event_id: EventId, count: u32) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE events
            SET available_slots = LEAST(available_slots + $2, total_capacity)
            WHERE id = $1
            ",
        )
        .bind(event_id.as_uuid())
        .bind(to_i32(count))
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn available_slots(&self, event_id: EventId) -> StoreResult<Option<u32>> {
        let slots: Option<i32> =
            sqlx::query_scalar("SELECT available_slots FROM events WHERE id = $1")
                .bind(event_id.as_uuid())
                .fetch_optional(self.pool())
                .await
                .map_err(map_db_error)?;

        slots.map(|s| to_u32(s, "available_slots")).transpose()
    }
}
