//! 补偿扫描（Sweeper）
//!
//! 周期拉取超过宽限期仍为 `Wait` 的事件并重新分发，覆盖以下情形：
//! 提交后进程崩溃、调度池拒绝、无处理器、失败待重试。
//! 宽限期避免与刚提交、正在正常分发的事件抢跑。
//!
use super::{DispatchOutcome, EventRouter};
use crate::error::DomainResult;
use bon::Builder;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweeperConfig {
    /// 扫描间隔
    pub interval: Duration,
    /// 单次最多拉取的记录数
    pub limit: usize,
    /// 创建后多久才视为漏投递
    pub grace: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            limit: 1000,
            grace: Duration::from_secs(60),
        }
    }
}

/// 单次扫描结果
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub fetched: usize,
    pub dispatched: usize,
    pub unrouted: usize,
    pub rejected: usize,
    pub skipped: usize,
}

#[derive(Builder)]
pub struct Sweeper {
    router: Arc<EventRouter>,
    #[builder(default)]
    config: SweeperConfig,
}

impl Sweeper {
    pub fn config(&self) -> SweeperConfig {
        self.config
    }

    /// 执行一次扫描并分发
    pub async fn sweep_once(&self) -> DomainResult<SweepReport> {
        let records = self
            .router
            .store()
            .query_all_pending(self.config.limit, self.config.grace)
            .await?;

        let mut report = SweepReport {
            fetched: records.len(),
            ..Default::default()
        };
        for record in records {
            match self.router.dispatch(record) {
                DispatchOutcome::Handler | DispatchOutcome::Listeners(_) => report.dispatched += 1,
                DispatchOutcome::Unrouted => report.unrouted += 1,
                DispatchOutcome::Rejected => report.rejected += 1,
                DispatchOutcome::Skipped | DispatchOutcome::Missing => report.skipped += 1,
            }
        }

        if report.fetched > 0 {
            tracing::info!(
                fetched = report.fetched,
                dispatched = report.dispatched,
                unrouted = report.unrouted,
                rejected = report.rejected,
                "pending events redelivered"
            );
        }
        Ok(report)
    }

    /// 启动周期扫描，返回可用于关闭/等待的句柄
    pub fn start(self: Arc<Self>) -> SweeperHandle {
        let token = CancellationToken::new();
        let task = {
            let token = token.clone();
            let interval = self.config.interval;
            tokio::spawn(async move {
                let mut ticker = time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {
                            if let Err(err) = self.sweep_once().await {
                                tracing::error!(error = %err, "query pending events failed");
                            }
                        }
                    }
                }
            })
        };

        SweeperHandle {
            token,
            task: Some(task),
        }
    }
}

/// 扫描任务句柄：用于优雅关闭与等待任务结束
pub struct SweeperHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
