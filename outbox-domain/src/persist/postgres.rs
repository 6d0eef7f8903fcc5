//! Postgres 实现（sqlx）
//!
//! - `OutboxTx` 直接实现在 `sqlx::Transaction<Postgres>` 上，插入走调用方事务；
//! - `PgStore` 持有连接池，负责事务之外的条件更新、点查、待补偿扫描与号段读写。
//!
use super::{OutboxStore, OutboxTx, SeqRecord, SeqStore, pending_cutoff};
use crate::error::DomainResult as Result;
use crate::event::{EventRecord, EventStatus, NewEventRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;

/// `event` 与 `seq` 两张表的建表语句
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS event (
    id            BIGSERIAL PRIMARY KEY,
    event         VARCHAR(100) NOT NULL DEFAULT '',
    "type"        SMALLINT NOT NULL DEFAULT 0,
    data          TEXT NOT NULL,
    status        SMALLINT NOT NULL DEFAULT 0,
    reason        VARCHAR(1000) NOT NULL DEFAULT '',
    version_lock  BIGINT NOT NULL DEFAULT 0,
    attempts      INTEGER NOT NULL DEFAULT 0,
    next_retry_at TIMESTAMPTZ NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS event_status_created_at_idx ON event (status, created_at);

CREATE TABLE IF NOT EXISTS seq (
    "key"   VARCHAR(100) PRIMARY KEY,
    min_seq BIGINT NOT NULL DEFAULT 0,
    step    BIGINT NOT NULL DEFAULT 1000
);
"#;

const EVENT_COLUMNS: &str = r#"id, event, "type", data, status, reason, version_lock, attempts, next_retry_at, created_at, updated_at"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行建表语句（幂等）
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }
}

fn record_from_row(row: &PgRow) -> Result<EventRecord> {
    Ok(EventRecord {
        id: row.try_get("id")?,
        event: row.try_get("event")?,
        event_type: row.try_get::<i16, _>("type")?.try_into()?,
        data: row.try_get("data")?,
        status: row.try_get::<i16, _>("status")?.try_into()?,
        reason: row.try_get("reason")?,
        version_lock: row.try_get("version_lock")?,
        attempts: row.try_get("attempts")?,
        next_retry_at: row.try_get("next_retry_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl<'c> OutboxTx for Transaction<'c, Postgres> {
    async fn insert_event(&mut self, record: NewEventRecord) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO event (event, "type", data, status) VALUES ($1, $2, $3, $4) RETURNING id"#,
        )
        .bind(record.event())
        .bind(record.event_type().as_i16())
        .bind(record.data())
        .bind(EventStatus::Wait.as_i16())
        .fetch_one(&mut **self)
        .await?;
        Ok(id)
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn update_status(
        &self,
        reason: &str,
        status: EventStatus,
        expected_version_lock: i64,
        id: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE event SET status = $1, reason = $2, version_lock = version_lock + 1, updated_at = now() \
             WHERE id = $3 AND version_lock = $4",
        )
        .bind(status.as_i16())
        .bind(reason)
        .bind(id)
        .bind(expected_version_lock)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn schedule_retry(
        &self,
        reason: &str,
        expected_version_lock: i64,
        id: i64,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE event SET reason = $1, attempts = attempts + 1, next_retry_at = $2, \
             version_lock = version_lock + 1, updated_at = now() \
             WHERE id = $3 AND version_lock = $4 AND status = $5",
        )
        .bind(reason)
        .bind(next_retry_at)
        .bind(id)
        .bind(expected_version_lock)
        .bind(EventStatus::Wait.as_i16())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query_by_id(&self, id: i64) -> Result<Option<EventRecord>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM event WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn query_all_pending(&self, limit: usize, grace: Duration) -> Result<Vec<EventRecord>> {
        let now = Utc::now();
        let cutoff = pending_cutoff(now, grace)?;
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM event \
             WHERE status = $1 AND created_at < $2 AND (next_retry_at IS NULL OR next_retry_at <= $3) \
             LIMIT $4"
        );
        let rows = sqlx::query(&sql)
            .bind(EventStatus::Wait.as_i16())
            .bind(cutoff)
            .bind(now)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl SeqStore for PgStore {
    async fn query_seq(&self, key: &str) -> Result<Option<SeqRecord>> {
        let row = sqlx::query(r#"SELECT "key", min_seq, step FROM seq WHERE "key" = $1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<SeqRecord> {
            Ok(SeqRecord {
                key: row.try_get("key")?,
                min_seq: row.try_get("min_seq")?,
                step: row.try_get("step")?,
            })
        })
        .transpose()
    }

    async fn reserve_seq(&self, key: &str, step: i64, base: i64) -> Result<i64> {
        let upper: i64 = sqlx::query_scalar(
            r#"INSERT INTO seq ("key", min_seq, step) VALUES ($1, $2, $3)
               ON CONFLICT ("key") DO UPDATE SET min_seq = seq.min_seq + EXCLUDED.step
               RETURNING min_seq"#,
        )
        .bind(key)
        .bind(base + step)
        .bind(step)
        .fetch_one(&self.pool)
        .await?;
        Ok(upper)
    }
}
