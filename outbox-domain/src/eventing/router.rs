//! 事件路由器（EventRouter）
//!
//! Outbox 的对外入口与分发中心：
//! - `event_begin`：在调用方事务内写入事件意图；
//! - `event_commit`：事务提交后按主键回读并分发；
//! - `dispatch`：优先交给该事件的处理器，否则广播给全部监听者，
//!   都没有则记录错误并保持 `Wait`，待注册后由 Sweeper 重投。
//!
//! 处理器与监听者都在调度池中执行，`dispatch` 从不等待业务逻辑。
//!
use super::finalize::{Finalizer, Ticket};
use super::{EventCommitter, EventHandler, EventListener, RetryPolicy};
use crate::error::DomainResult;
use crate::event::{EventKind, EventRecord, NewEventRecord};
use crate::persist::{OutboxStore, OutboxTx};
use crate::pool::{Job, WorkerPool};
use bon::Builder;
use dashmap::DashMap;
use std::sync::Arc;

/// 一次分发的去向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 已提交给处理器
    Handler,
    /// 已提交给 n 个监听者
    Listeners(usize),
    /// 无处理器也无监听者，记录保持 `Wait`
    Unrouted,
    /// 记录已是终态，忽略
    Skipped,
    /// 调度池拒绝（已停止或队列满），记录保持 `Wait`
    Rejected,
    /// `event_commit` 未能读到记录
    Missing,
}

#[derive(Builder)]
pub struct EventRouter {
    store: Arc<dyn OutboxStore>,
    pool: Arc<WorkerPool>,
    #[builder(default)]
    retry: RetryPolicy,
    #[builder(skip)]
    handlers: DashMap<EventKind, Arc<dyn EventHandler>>,
    #[builder(skip)]
    listeners: DashMap<String, Vec<Arc<dyn EventListener>>>,
}

impl EventRouter {
    /// 注册已知事件的处理器；重复注册以后者为准
    pub fn register_handler(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        let name = handler.handler_name().to_string();
        if let Some(previous) = self.handlers.insert(kind, handler) {
            tracing::warn!(
                event = %kind,
                previous = previous.handler_name(),
                current = %name,
                "event handler replaced"
            );
        }
    }

    /// 追加一个按事件名订阅的监听者
    pub fn register_listener(&self, event: impl Into<String>, listener: Arc<dyn EventListener>) {
        self.listeners.entry(event.into()).or_default().push(listener);
    }

    pub fn store(&self) -> &Arc<dyn OutboxStore> {
        &self.store
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// 在调用方事务内写入事件，返回事件主键；失败时调用方应回滚
    pub async fn event_begin<T>(&self, record: NewEventRecord, tx: &mut T) -> DomainResult<i64>
    where
        T: OutboxTx + ?Sized,
    {
        let event = record.event().to_string();
        let id = tx.insert_event(record).await?;
        tracing::debug!(event_id = id, %event, "event recorded");
        Ok(id)
    }

    /// 事务提交后触发分发；读取失败只记录日志，由 Sweeper 兜底
    pub async fn event_commit(&self, id: i64) -> DispatchOutcome {
        match self.store.query_by_id(id).await {
            Ok(Some(record)) => self.dispatch(record),
            Ok(None) => {
                tracing::warn!(event_id = id, "committed event not found");
                DispatchOutcome::Missing
            }
            Err(err) => {
                tracing::error!(event_id = id, error = %err, "load committed event failed");
                DispatchOutcome::Missing
            }
        }
    }

    /// 将记录交给调度池执行，不等待执行结果
    pub fn dispatch(&self, record: EventRecord) -> DispatchOutcome {
        if record.status.is_terminal() {
            tracing::debug!(event_id = record.id, status = ?record.status, "event already final");
            return DispatchOutcome::Skipped;
        }

        let handler = record
            .kind()
            .and_then(|kind| self.handlers.get(&kind).map(|h| h.value().clone()));
        if let Some(handler) = handler {
            return self.submit_handler(handler, record);
        }

        let listeners = self
            .listeners
            .get(&record.event)
            .map(|l| l.value().clone())
            .unwrap_or_default();
        if !listeners.is_empty() {
            return self.submit_listeners(listeners, record);
        }

        tracing::error!(
            event_id = record.id,
            event = %record.event,
            "no handler or listener for event"
        );
        DispatchOutcome::Unrouted
    }

    fn finalizer(&self) -> Finalizer {
        Finalizer::new(self.store.clone(), self.retry)
    }

    fn submit_handler(&self, handler: Arc<dyn EventHandler>, record: EventRecord) -> DispatchOutcome {
        let id = record.id;
        let label = format!("{}#{}", record.event, id);
        let finalizer = self.finalizer();

        let job = Job::new(record, move |worker_id, record: EventRecord| async move {
            let ticket = Ticket::from(&record);
            let outcome = handler.handle(&record).await;
            if let Err(err) = &outcome {
                tracing::error!(
                    worker_id,
                    event_id = record.id,
                    handler = handler.handler_name(),
                    error = %format!("{err:#}"),
                    "event handler failed"
                );
            }
            if let Err(err) = finalizer.finalize(&ticket, outcome).await {
                tracing::error!(event_id = record.id, error = %err, "update event status failed");
            }
        })
        .labeled(label);

        match self.pool.submit(job) {
            Ok(()) => DispatchOutcome::Handler,
            Err(err) => {
                tracing::error!(event_id = id, error = %err, "event dispatch rejected");
                DispatchOutcome::Rejected
            }
        }
    }

    fn submit_listeners(
        &self,
        listeners: Vec<Arc<dyn EventListener>>,
        record: EventRecord,
    ) -> DispatchOutcome {
        let ticket = Ticket::from(&record);
        let mut submitted = 0;

        for listener in listeners {
            let committer = EventCommitter::new(self.finalizer(), ticket.clone());
            let data = record.data.clone();
            let job = Job::new(data, move |_, data: String| async move {
                listener.on_event(&data, committer).await;
            })
            .labeled(format!("{}#{}", record.event, record.id));

            match self.pool.submit(job) {
                Ok(()) => submitted += 1,
                Err(err) => {
                    tracing::error!(event_id = record.id, error = %err, "listener dispatch rejected");
                }
            }
        }

        if submitted == 0 {
            DispatchOutcome::Rejected
        } else {
            DispatchOutcome::Listeners(submitted)
        }
    }
}
