//! 事件监听者（EventListener）
//!
//! 按事件名动态注册、可多播的扩展点。监听者拿到负载与一个 `EventCommitter`，
//! 处理完毕后必须调用 `commit` 报告结果，路由器据此写回记录状态；
//! 未调用即丢弃的提交器会留下一条 `Wait` 记录，等待 Sweeper 重投。
//!
use super::finalize::{Finalizer, Ticket};
use crate::error::DomainResult;
use async_trait::async_trait;
use std::future::Future;

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, data: &str, committer: EventCommitter);
}

/// 监听者的完成回调
pub struct EventCommitter {
    finalizer: Finalizer,
    ticket: Ticket,
    committed: bool,
}

impl EventCommitter {
    pub(crate) fn new(finalizer: Finalizer, ticket: Ticket) -> Self {
        Self {
            finalizer,
            ticket,
            committed: false,
        }
    }

    pub fn event_id(&self) -> i64 {
        self.ticket.id
    }

    pub fn event(&self) -> &str {
        &self.ticket.event
    }

    /// 报告处理结果；返回本次写回是否生效（已被其他投递写回时为 `false`）
    pub async fn commit(mut self, outcome: anyhow::Result<()>) -> DomainResult<bool> {
        self.committed = true;
        self.finalizer.finalize(&self.ticket, outcome).await
    }
}

impl Drop for EventCommitter {
    fn drop(&mut self) {
        if !self.committed {
            tracing::warn!(
                event_id = self.ticket.id,
                event = %self.ticket.event,
                "listener dropped committer without committing"
            );
        }
    }
}

/// 以闭包充当监听者
pub struct FnListener<F> {
    f: F,
}

pub fn listener_fn<F, Fut>(f: F) -> FnListener<F>
where
    F: Fn(String, EventCommitter) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    FnListener { f }
}

#[async_trait]
impl<F, Fut> EventListener for FnListener<F>
where
    F: Fn(String, EventCommitter) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn on_event(&self, data: &str, committer: EventCommitter) {
        (self.f)(data.to_string(), committer).await
    }
}
