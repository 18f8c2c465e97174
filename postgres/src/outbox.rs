//! The `notification_outbox` table.

use crate::{PostgresStore, map_db_error, to_i32, to_u32};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enrollment_core::store::OutboxStore;
use enrollment_core::types::{OutboxEntry, OutboxId, OutboxPayload, OutboxStatus, RetryUpdate};
use enrollment_core::{StoreError, StoreResult};
use sqlx::Row;
use sqlx::postgres::PgRow;

const OUTBOX_COLUMNS: &str = "id, payload, status, retry_attempts, last_attempt_time, \
     last_error, next_attempt_time, created_at";

fn row_to_entry(row: &PgRow) -> StoreResult<OutboxEntry> {
    let payload: serde_json::Value = row.get("payload");
    let payload: OutboxPayload = serde_json::from_value(payload)
        .map_err(|e| StoreError::Serialization(format!("outbox payload: {e}")))?;
    let status: String = row.get("status");

    Ok(OutboxEntry {
        id: OutboxId::from_uuid(row.get("id")),
        payload,
        status: status.parse::<OutboxStatus>().map_err(StoreError::Serialization)?,
        retry_attempts: to_u32(row.get("retry_attempts"), "retry_attempts")?,
        last_attempt_time: row.get("last_attempt_time"),
        last_error: row.get("last_error"),
        next_attempt_time: row.get("next_attempt_time"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl OutboxStore for PostgresStore {
    async fn save(&self, entry: &OutboxEntry) -> StoreResult<()> {
        let payload = serde_json::to_value(&entry.payload)
            .map_err(|e| StoreError::Serialization(format!("outbox payload: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO notification_outbox (
                id, payload, status, retry_attempts, last_attempt_time,
                last_error, next_attempt_time, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(entry.id.as_uuid())
        .bind(payload)
        .bind(entry.status.as_str())
        .bind(to_i32(entry.retry_attempts))
        .bind(entry.last_attempt_time)
        .bind(&entry.last_error)
        .bind(entry.next_attempt_time)
        .bind(entry.created_at)
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_cutoff: DateTime<Utc>,
        batch_size: u32,
    ) -> StoreResult<Vec<OutboxEntry>> {
        let rows = sqlx::query(
            r"
            UPDATE notification_outbox o
            SET status = 'PENDING', last_attempt_time = $1
            FROM (
                SELECT id
                FROM notification_outbox
                WHERE (status = 'FAILED' AND next_attempt_time <= $1)
                   OR (status = 'PENDING'
                       AND (last_attempt_time IS NULL OR last_attempt_time < $2))
                ORDER BY next_attempt_time
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            ) due
            WHERE o.id = due.id
            RETURNING o.id, o.payload, o.status, o.retry_attempts, o.last_attempt_time,
                      o.last_error, o.next_attempt_time, o.created_at
            ",
        )
        .bind(now)
        .bind(lease_cutoff)
        .bind(i64::from(to_i32(batch_size)))
        .fetch_all(self.pool())
        .await
        .map_err(map_db_error)?;

        let mut entries = rows.iter().map(row_to_entry).collect::<StoreResult<Vec<_>>>()?;
        entries.sort_by_key(|e| e.next_attempt_time);

        if !entries.is_empty() {
            tracing::debug!(claimed = entries.len(), "Claimed due outbox entries");
        }
        Ok(entries)
    }

    async fn mark_sent(&self, id: OutboxId, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE notification_outbox
            SET status = 'SENT', last_attempt_time = $2
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn record_failure(&self, id: OutboxId, update: &RetryUpdate) -> StoreResult<()> {
        sqlx::query(
            r"
            UPDATE notification_outbox
            SET status = $2, retry_attempts = $3, next_attempt_time = $4, last_error = $5
            WHERE id = $1
            ",
        )
        .bind(id.as_uuid())
        .bind(update.status.as_str())
        .bind(to_i32(update.retry_attempts))
        .bind(update.next_attempt_time)
        .bind(&update.last_error)
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r"
            DELETE FROM notification_outbox
            WHERE status IN ('SENT', 'PERMANENT_FAILURE')
              AND COALESCE(last_attempt_time, created_at) < $1
            ",
        )
        .bind(cutoff)
        .execute(self.pool())
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected())
    }

    async fn find(&self, id: OutboxId) -> StoreResult<Option<OutboxEntry>> {
        let query = format!("SELECT {OUTBOX_COLUMNS} FROM notification_outbox WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(map_db_error)?;

        row.as_ref().map(row_to_entry).transpose()
    }
}
