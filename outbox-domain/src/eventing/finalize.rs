//! 执行结果写回
//!
//! 以分发时捕获的 `version_lock` 做条件更新：同一条记录被重复投递时，
//! 只有第一个写回者生效，其余写回返回 `false` 并被忽略。
//!
use super::RetryPolicy;
use crate::error::DomainResult;
use crate::event::{EventRecord, EventStatus};
use crate::persist::OutboxStore;
use chrono::Utc;
use std::sync::Arc;

/// 分发时刻的记录快照
#[derive(Clone, Debug)]
pub(crate) struct Ticket {
    pub(crate) id: i64,
    pub(crate) event: String,
    pub(crate) version_lock: i64,
    pub(crate) attempts: i32,
}

impl From<&EventRecord> for Ticket {
    fn from(record: &EventRecord) -> Self {
        Self {
            id: record.id,
            event: record.event.clone(),
            version_lock: record.version_lock,
            attempts: record.attempts,
        }
    }
}

#[derive(Clone)]
pub(crate) struct Finalizer {
    store: Arc<dyn OutboxStore>,
    retry: RetryPolicy,
}

impl Finalizer {
    pub(crate) fn new(store: Arc<dyn OutboxStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// 成功写 `Success`；失败时在重试预算内推迟重投，否则写 `Fail`
    pub(crate) async fn finalize(
        &self,
        ticket: &Ticket,
        outcome: anyhow::Result<()>,
    ) -> DomainResult<bool> {
        let applied = match outcome {
            Ok(()) => {
                self.store
                    .update_status("", EventStatus::Success, ticket.version_lock, ticket.id)
                    .await?
            }
            Err(err) => {
                let reason = format!("{err:#}");
                let prior = ticket.attempts.max(0) as u32;
                if self.retry.should_retry(prior + 1) {
                    let delay = chrono::Duration::from_std(self.retry.backoff.delay(prior))?;
                    let next_retry_at = Utc::now() + delay;
                    tracing::warn!(
                        event_id = ticket.id,
                        event = %ticket.event,
                        attempt = prior + 1,
                        %next_retry_at,
                        %reason,
                        "event failed, retry scheduled"
                    );
                    self.store
                        .schedule_retry(&reason, ticket.version_lock, ticket.id, next_retry_at)
                        .await?
                } else {
                    tracing::error!(
                        event_id = ticket.id,
                        event = %ticket.event,
                        attempt = prior + 1,
                        %reason,
                        "event failed"
                    );
                    self.store
                        .update_status(&reason, EventStatus::Fail, ticket.version_lock, ticket.id)
                        .await?
                }
            }
        };

        if !applied {
            tracing::debug!(
                event_id = ticket.id,
                version_lock = ticket.version_lock,
                "event already finalized elsewhere"
            );
        }
        Ok(applied)
    }
}
