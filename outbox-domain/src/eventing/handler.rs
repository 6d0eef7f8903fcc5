//! 事件处理器（EventHandler）
//!
//! 编译期已知事件（`EventKind`）的唯一处理者。处理器只负责业务副作用，
//! 记录的终态由路由器根据返回值写回。
//!
use crate::event::EventRecord;
use async_trait::async_trait;
use std::future::Future;

/// 事件处理器：处理某一类已知事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志与失败原因）
    fn handler_name(&self) -> &str;
    /// 处理事件；返回错误即视为本次执行失败
    async fn handle(&self, event: &EventRecord) -> anyhow::Result<()>;
}

/// 以闭包充当处理器
pub struct FnHandler<F> {
    name: String,
    f: F,
}

pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(EventRecord) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(EventRecord) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &EventRecord) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}
