//! Reservation records, status transitions and the expiry batch.

use crate::{PostgresStore, map_db_error, to_i32};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enrollment_core::store::ReservationRepository;
use enrollment_core::types::{
    EventId, ExpiredReservation, PaymentStatus, Reservation, ReservationId, ReservationNumber,
};
use enrollment_core::{StoreError, StoreResult};
use sqlx::Row;
use sqlx::postgres::PgRow;

const RESERVATION_COLUMNS: &str = "id, reservation_number, event_id, email, first_name, \
     last_name, payment_status, payment_reference, created_at, updated_at";

fn row_to_reservation(row: &PgRow) -> StoreResult<Reservation> {
    let status: String = row.get("payment_status");
    let payment_status = status.parse::<PaymentStatus>().map_err(StoreError::Serialization)?;

    Ok(Reservation {
        id: ReservationId::from_uuid(row.get("id")),
        reservation_number: ReservationNumber::new(row.get::<String, _>("reservation_number")),
        event_id: EventId::from_uuid(row.get("event_id")),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        payment_status,
        payment_reference: row.get("payment_reference"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ReservationRepository for PostgresStore {
    async fn insert(&self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO reservations (
                id, reservation_number, event_id, email, first_name, last_name,
                payment_status, payment_reference, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.reservation_number.as_str())
        .bind(reservation.event_id.as_uuid())
        .bind(&reservation.email)
        .bind(&reservation.first_name)
        .bind(&reservation.last_name)
        .bind(reservation.payment_status.as_str())
        .bind(&reservation.payment_reference)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn find_by_number(&self, number: &ReservationNumber) -> StoreResult<Option<Reservation>> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE reservation_number = $1"
        );
        let row = sqlx::query(&query)
            .bind(number.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_db_error)?;

        row.as_ref().map(row_to_reservation).transpose()
    }

    async fn has_confirmed(&self, event_id: EventId, email: &str) -> StoreResult<bool> {
        sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE event_id = $1 AND email = $2 AND payment_status = 'CONFIRMED'
            )
            ",
        )
        .bind(event_id.as_uuid())
        .bind(email)
        .fetch_one(self.pool())
        .await
        .map_err(map_db_error)
    }

    async fn transition(
        &self,
        number: &ReservationNumber,
        from: PaymentStatus,
        to: PaymentStatus,
        payment_reference: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE reservations
            SET payment_status = $3,
                payment_reference = COALESCE($4, payment_reference),
                updated_at = $5
            WHERE reservation_number = $1 AND payment_status = $2
            ",
        )
        .bind(number.as_str())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(payment_reference)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        let applied = result.rows_affected() == 1;
        if !applied {
            tracing::debug!(
                reservation_number = %number,
                from = %from,
                to = %to,
                "Conditional transition matched no row"
            );
        }
        Ok(applied)
    }

    async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<ExpiredReservation>> {
        // Data-modifying CTEs run exactly once, so the slot restore happens
        // in the same statement as the status change.
        let rows = sqlx::query(
            r"
            WITH stale AS (
                SELECT id
                FROM reservations
                WHERE payment_status = 'PENDING_PAYMENT' AND created_at < $1
                ORDER BY created_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            ),
            expired AS (
                UPDATE reservations r
                SET payment_status = 'EXPIRED', updated_at = $3
                FROM stale
                WHERE r.id = stale.id AND r.payment_status = 'PENDING_PAYMENT'
                RETURNING r.reservation_number, r.event_id
            ),
            restored AS (
                UPDATE events e
                SET available_slots = LEAST(e.available_slots + freed.n, e.total_capacity)
                FROM (
                    SELECT event_id, COUNT(*)::INTEGER AS n
                    FROM expired
                    GROUP BY event_id
                ) freed
                WHERE e.id = freed.event_id
                RETURNING e.id
            )
            SELECT reservation_number, event_id FROM expired
            ",
        )
        .bind(cutoff)
        .bind(i64::from(to_i32(batch_size)))
        .bind(at)
        .fetch_all(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(rows
            .iter()
            .map(|row| ExpiredReservation {
                reservation_number: ReservationNumber::new(
                    row.get::<String, _>("reservation_number"),
                ),
                event_id: EventId::from_uuid(row.get("event_id")),
            })
            .collect())
    }
}
