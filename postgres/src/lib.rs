//! `PostgreSQL` storage for the enrollment engine.
//!
//! [`PostgresStore`] implements every storage port from `enrollment-core`
//! against one connection pool:
//!
//! - [`EventCatalog`](enrollment_core::store::EventCatalog) and
//!   [`InventoryStore`](enrollment_core::store::InventoryStore) over `events`
//! - [`ReservationRepository`](enrollment_core::store::ReservationRepository)
//!   over `reservations`
//! - [`OutboxStore`](enrollment_core::store::OutboxStore) over
//!   `notification_outbox`
//!
//! Every invariant is carried by a single statement: conditional updates for
//! the slot counter and status transitions, `FOR UPDATE SKIP LOCKED` for the
//! expiry sweep and outbox claims, and a partial unique index for "one
//! confirmed enrollment per attendee".
//!
//! # Example
//!
//! ```ignore
//! use enrollment_postgres::PostgresStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStore::connect("postgres://localhost/enrollment", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod inventory;
mod outbox;
mod reservations;

use async_trait::async_trait;
use enrollment_core::store::StoreHealth;
use enrollment_core::{Conflict, StoreError, StoreResult};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Constraint backing [`Conflict::ReservationNumber`]
const RESERVATION_NUMBER_UNIQUE: &str = "reservations_number_unique";

/// Partial unique index backing [`Conflict::ConfirmedEnrollment`]
const ONE_CONFIRMED_PER_ATTENDEE: &str = "reservations_one_confirmed_per_attendee";

/// PostgreSQL-backed implementation of all storage ports.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;

        tracing::info!("Database migrations applied");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreHealth for PostgresStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

/// Map a sqlx error, recognising the constraints the engine reacts to.
fn map_db_error(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &error {
        if db.is_unique_violation() {
            match db.constraint() {
                Some(RESERVATION_NUMBER_UNIQUE) => {
                    return StoreError::Conflict(Conflict::ReservationNumber);
                }
                Some(ONE_CONFIRMED_PER_ATTENDEE) => {
                    return StoreError::Conflict(Conflict::ConfirmedEnrollment);
                }
                _ => {}
            }
        }
    }
    StoreError::Database(error.to_string())
}

/// Convert a non-negative `INTEGER` column to `u32`.
fn to_u32(value: i32, column: &str) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::Serialization(format!("negative value in {column}: {value}")))
}

/// Convert a `u32` to the `INTEGER` bound by queries, saturating.
fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_columns_reject_negative_values() {
        assert_eq!(to_u32(7, "available_slots"), Ok(7));
        assert!(matches!(
            to_u32(-1, "available_slots"),
            Err(StoreError::Serialization(msg)) if msg.contains("available_slots")
        ));
    }

    #[test]
    fn bind_values_saturate() {
        assert_eq!(to_i32(50), 50);
        assert_eq!(to_i32(u32::MAX), i32::MAX);
    }

    #[test]
    fn non_constraint_errors_map_to_database() {
        assert!(matches!(
            map_db_error(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }
}
