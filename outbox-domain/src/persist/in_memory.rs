//! 内存版数据库（InMemoryDatabase）
//!
//! 以最小代价模拟事务型关系存储：
//! - `begin` 返回缓冲写入的 `InMemoryTx`，`commit` 时原子落盘，`rollback`/丢弃则全部作废；
//! - 事件主键在插入时分配（与自增列一致，回滚会留下空洞）；
//! - 状态更新以行级原子的比较-交换实现乐观锁语义。
//!
//! 典型用途：测试环境、示例与本地开发。
//!
use super::{OutboxStore, OutboxTx, SeqRecord, SeqStore, pending_cutoff};
use crate::error::DomainResult as Result;
use crate::event::{EventRecord, EventStatus, NewEventRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    events: BTreeMap<i64, EventRecord>,
    seqs: HashMap<String, SeqRecord>,
    rows: HashMap<(String, String), Value>,
}

/// 可克隆的共享句柄，克隆体指向同一份数据
#[derive(Clone, Default)]
pub struct InMemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    next_event_id: Arc<AtomicI64>,
}

impl InMemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开启事务
    pub fn begin(&self) -> InMemoryTx {
        InMemoryTx {
            db: self.clone(),
            events: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// 读取已提交的业务行
    pub async fn row(&self, table: &str, key: &str) -> Option<Value> {
        let tables = self.tables.lock().await;
        tables
            .rows
            .get(&(table.to_string(), key.to_string()))
            .cloned()
    }

    /// 已提交事件的快照（按主键升序）
    pub async fn events(&self) -> Vec<EventRecord> {
        let tables = self.tables.lock().await;
        tables.events.values().cloned().collect()
    }
}

/// 内存事务：写入先缓冲，提交时一次性可见
pub struct InMemoryTx {
    db: InMemoryDatabase,
    events: Vec<EventRecord>,
    rows: Vec<((String, String), Value)>,
}

impl InMemoryTx {
    /// 事务内写入一行业务数据
    pub fn insert_row(&mut self, table: &str, key: &str, value: Value) {
        self.rows.push(((table.to_string(), key.to_string()), value));
    }

    pub async fn commit(self) -> Result<()> {
        let mut tables = self.db.tables.lock().await;
        for (key, value) in self.rows {
            tables.rows.insert(key, value);
        }
        for record in self.events {
            tables.events.insert(record.id, record);
        }
        Ok(())
    }

    pub fn rollback(self) {}
}

#[async_trait]
impl OutboxTx for InMemoryTx {
    async fn insert_event(&mut self, record: NewEventRecord) -> Result<i64> {
        let id = self.db.next_event_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.push(EventRecord::pending(id, record, Utc::now()));
        Ok(id)
    }
}

#[async_trait]
impl OutboxStore for InMemoryDatabase {
    async fn update_status(
        &self,
        reason: &str,
        status: EventStatus,
        expected_version_lock: i64,
        id: i64,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.events.get_mut(&id) else {
            return Ok(false);
        };
        if record.version_lock != expected_version_lock {
            return Ok(false);
        }
        record.status = status;
        record.reason = reason.to_string();
        record.version_lock += 1;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn schedule_retry(
        &self,
        reason: &str,
        expected_version_lock: i64,
        id: i64,
        next_retry_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.events.get_mut(&id) else {
            return Ok(false);
        };
        if record.version_lock != expected_version_lock || record.status != EventStatus::Wait {
            return Ok(false);
        }
        record.reason = reason.to_string();
        record.attempts += 1;
        record.next_retry_at = Some(next_retry_at);
        record.version_lock += 1;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn query_by_id(&self, id: i64) -> Result<Option<EventRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.events.get(&id).cloned())
    }

    async fn query_all_pending(&self, limit: usize, grace: Duration) -> Result<Vec<EventRecord>> {
        let now = Utc::now();
        let cutoff = pending_cutoff(now, grace)?;
        let tables = self.tables.lock().await;
        Ok(tables
            .events
            .values()
            .filter(|r| is_pending(r, cutoff, now))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// 与 SQL 实现同一判定：`created_at` 严格早于截止时间
fn is_pending(record: &EventRecord, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    record.status == EventStatus::Wait
        && record.created_at < cutoff
        && record.next_retry_at.is_none_or(|at| at <= now)
}

#[async_trait]
impl SeqStore for InMemoryDatabase {
    async fn query_seq(&self, key: &str) -> Result<Option<SeqRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables.seqs.get(key).cloned())
    }

    async fn reserve_seq(&self, key: &str, step: i64, base: i64) -> Result<i64> {
        let mut tables = self.tables.lock().await;
        let record = tables
            .seqs
            .entry(key.to_string())
            .and_modify(|existing| existing.min_seq += step)
            .or_insert_with(|| SeqRecord {
                key: key.to_string(),
                min_seq: base + step,
                step,
            });
        Ok(record.min_seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventType;

    fn new_event(name: &str) -> NewEventRecord {
        NewEventRecord::builder()
            .event(name)
            .event_type(EventType::Message)
            .data(r#"{"group_no":"g1"}"#)
            .build()
    }

    #[tokio::test]
    async fn rollback_discards_events_and_rows() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin();
        tx.insert_row("group", "g1", serde_json::json!({"name": "g"}));
        let id = tx.insert_event(new_event("group.create")).await.unwrap();
        tx.rollback();

        assert!(db.query_by_id(id).await.unwrap().is_none());
        assert!(db.row("group", "g1").await.is_none());
    }

    #[tokio::test]
    async fn commit_makes_event_visible_as_wait() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin();
        tx.insert_row("group", "g1", serde_json::json!({"name": "g"}));
        let id = tx.insert_event(new_event("group.create")).await.unwrap();
        tx.commit().await.unwrap();

        let rec = db.query_by_id(id).await.unwrap().unwrap();
        assert_eq!(rec.status, EventStatus::Wait);
        assert_eq!(rec.event, "group.create");
        assert!(db.row("group", "g1").await.is_some());
    }

    #[tokio::test]
    async fn update_status_is_conditioned_on_version_lock() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin();
        let id = tx.insert_event(new_event("group.create")).await.unwrap();
        tx.commit().await.unwrap();

        assert!(db.update_status("", EventStatus::Success, 0, id).await.unwrap());
        // 同一个 version_lock 的第二次写入是空操作
        assert!(!db.update_status("boom", EventStatus::Fail, 0, id).await.unwrap());
        // 不存在的行同样不是错误
        assert!(!db.update_status("", EventStatus::Success, 0, 999).await.unwrap());

        let rec = db.query_by_id(id).await.unwrap().unwrap();
        assert_eq!(rec.status, EventStatus::Success);
        assert_eq!(rec.version_lock, 1);
        assert!(rec.reason.is_empty());
    }

    #[tokio::test]
    async fn pending_scan_honours_grace_status_and_retry_time() {
        let db = InMemoryDatabase::new();
        let mut tx = db.begin();
        let a = tx.insert_event(new_event("a")).await.unwrap();
        let b = tx.insert_event(new_event("b")).await.unwrap();
        let c = tx.insert_event(new_event("c")).await.unwrap();
        tx.commit().await.unwrap();

        // 宽限期内的事件不会被扫描到
        let fresh = db
            .query_all_pending(10, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(fresh.is_empty());

        db.update_status("", EventStatus::Success, 0, a).await.unwrap();
        let later = Utc::now() + chrono::Duration::seconds(600);
        assert!(db.schedule_retry("flaky", 0, b, later).await.unwrap());

        let pending = db.query_all_pending(10, Duration::ZERO).await.unwrap();
        let ids: Vec<i64> = pending.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![c]);

        let limited = db.query_all_pending(0, Duration::ZERO).await.unwrap();
        assert!(limited.is_empty());
    }

    #[test]
    fn grace_cutoff_is_exclusive() {
        let now = Utc::now();
        let mut record = EventRecord::pending(1, new_event("a"), now);
        assert!(!is_pending(&record, now, now));

        record.created_at = now - chrono::Duration::milliseconds(1);
        assert!(is_pending(&record, now, now));

        record.next_retry_at = Some(now + chrono::Duration::seconds(1));
        assert!(!is_pending(&record, now, now));
    }

    #[tokio::test]
    async fn seq_reservation_advances_stored_bound() {
        let db = InMemoryDatabase::new();
        assert!(db.query_seq("seq:group").await.unwrap().is_none());
        assert_eq!(db.reserve_seq("seq:group", 5, 10).await.unwrap(), 15);
        // 已有行只累加 min_seq，忽略 base，不改写 step
        assert_eq!(db.reserve_seq("seq:group", 99, 0).await.unwrap(), 114);
        let rec = db.query_seq("seq:group").await.unwrap().unwrap();
        assert_eq!(rec.min_seq, 114);
        assert_eq!(rec.step, 5);
    }
}
