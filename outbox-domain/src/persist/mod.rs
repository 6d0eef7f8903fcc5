//! 持久化协议（persist）
//!
//! 定义 Outbox 与序列号两张表的读写接口：
//! - `OutboxTx`：由调用方持有的事务句柄实现，保证事件意图与业务写入同事务提交；
//! - `OutboxStore`：事务之外的状态更新（乐观锁条件更新）、点查与待补偿扫描；
//! - `SeqStore`：号段上界的读取与原子预留。
//!
//! 提供内存实现（测试、示例）与基于 sqlx 的 Postgres 实现（`infra-sqlx` 特性）。
//!
mod in_memory;
#[cfg(feature = "infra-sqlx")]
mod postgres;

pub use in_memory::{InMemoryDatabase, InMemoryTx};
#[cfg(feature = "infra-sqlx")]
pub use postgres::{PgStore, SCHEMA_SQL};

use crate::error::DomainResult as Result;
use crate::event::{EventRecord, EventStatus, NewEventRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// 事务内写入：仅由调用方已开启的事务实现，自身绝不开启事务
#[async_trait]
pub trait OutboxTx: Send {
    /// 插入一条 `Wait` 状态的事件，返回存储分配的主键
    async fn insert_event(&mut self, record: NewEventRecord) -> Result<i64>;
}

/// Outbox 表在事务之外的读写
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// 条件更新：仅当持久化的 `version_lock` 等于 `expected_version_lock` 时生效，
    /// 并递增 `version_lock`。未命中任何行返回 `Ok(false)`，不视为错误。
    async fn update_status(
        &self,
        reason: &str,
        status: EventStatus,
        expected_version_lock: i64,
        id: i64,
    ) -> Result<bool>;

    /// 条件更新：保持 `Wait`，累加 `attempts` 并推迟到 `next_retry_at` 之后再被扫描
    async fn schedule_retry(
        &self,
        reason: &str,
        expected_version_lock: i64,
        id: i64,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn query_by_id(&self, id: i64) -> Result<Option<EventRecord>>;

    /// 拉取创建时间早于 `now - grace` 且仍为 `Wait` 的事件，结果无序
    async fn query_all_pending(&self, limit: usize, grace: Duration) -> Result<Vec<EventRecord>>;
}

#[async_trait]
impl<T> OutboxStore for Arc<T>
where
    T: OutboxStore + ?Sized,
{
    async fn update_status(
        &self,
        reason: &str,
        status: EventStatus,
        expected_version_lock: i64,
        id: i64,
    ) -> Result<bool> {
        (**self)
            .update_status(reason, status, expected_version_lock, id)
            .await
    }

    async fn schedule_retry(
        &self,
        reason: &str,
        expected_version_lock: i64,
        id: i64,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool> {
        (**self)
            .schedule_retry(reason, expected_version_lock, id, next_retry_at)
            .await
    }

    async fn query_by_id(&self, id: i64) -> Result<Option<EventRecord>> {
        (**self).query_by_id(id).await
    }

    async fn query_all_pending(&self, limit: usize, grace: Duration) -> Result<Vec<EventRecord>> {
        (**self).query_all_pending(limit, grace).await
    }
}

/// `seq` 表的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeqRecord {
    /// `seq:<flag>`
    pub key: String,
    /// 已持久化预留的号段上界
    pub min_seq: i64,
    pub step: i64,
}

/// 号段持久化
#[async_trait]
pub trait SeqStore: Send + Sync {
    async fn query_seq(&self, key: &str) -> Result<Option<SeqRecord>>;

    /// 原子预留一个号段，返回预留后的新上界
    ///
    /// 行不存在时以 `base + step` 插入；存在时 `min_seq += step`。
    /// 两个步骤必须在存储内一次完成，调用方只拥有 `(上界 - step, 上界]`。
    async fn reserve_seq(&self, key: &str, step: i64, base: i64) -> Result<i64>;
}

#[async_trait]
impl<T> SeqStore for Arc<T>
where
    T: SeqStore + ?Sized,
{
    async fn query_seq(&self, key: &str) -> Result<Option<SeqRecord>> {
        (**self).query_seq(key).await
    }

    async fn reserve_seq(&self, key: &str, step: i64, base: i64) -> Result<i64> {
        (**self).reserve_seq(key, step, base).await
    }
}

/// 由宽限期推导扫描截止时间
pub(crate) fn pending_cutoff(now: DateTime<Utc>, grace: Duration) -> Result<DateTime<Utc>> {
    Ok(now - chrono::Duration::from_std(grace)?)
}
