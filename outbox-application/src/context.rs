use crate::config::OutboxConfig;
use crate::error::AppError;
use outbox_domain::event::{EventKind, NewEventRecord};
use outbox_domain::eventing::{
    DispatchOutcome, EventHandler, EventListener, EventRouter, SweepReport, Sweeper,
    SweeperHandle,
};
use outbox_domain::persist::{OutboxStore, OutboxTx, SeqStore};
use outbox_domain::pool::{PoolSnapshot, WorkerPool};
use outbox_domain::seq::SequenceAllocator;
use parking_lot::Mutex;
use std::sync::Arc;

/// 应用上下文（Application Context）
///
/// 由启动代码显式构造一次，持有 Outbox 子系统的全部运行时部件：
/// - 事件路由器与其背后的调度池；
/// - 号段序列号分配器；
/// - 补偿扫描任务（`start_sweeper` 后）。
///
/// 业务模块通过它写入事件、注册处理器/监听者、申请序列号。
///
/// 典型用法：
/// ```rust,no_run
/// use outbox_application::config::OutboxConfig;
/// use outbox_application::context::AppContext;
/// use outbox_domain::persist::InMemoryDatabase;
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), outbox_application::error::AppError> {
/// let db = InMemoryDatabase::new();
/// let ctx = AppContext::new(OutboxConfig::from_env()?, Arc::new(db.clone()));
/// ctx.start_sweeper();
///
/// let mut tx = db.begin();
/// // ... 业务写入与 ctx.event_begin(..., &mut tx)
/// tx.commit().await?;
/// ctx.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct AppContext {
    config: OutboxConfig,
    seq: Arc<SequenceAllocator>,
    pool: Arc<WorkerPool>,
    router: Arc<EventRouter>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

/// 业务模块在启动时向上下文登记自己的处理器与监听者
pub trait EventModule: Send + Sync {
    fn name(&self) -> &str;
    fn install(&self, ctx: &AppContext);
}

impl AppContext {
    /// 以同一个数据库句柄同时充当 Outbox 与号段存储（需在 tokio 运行时内调用）
    pub fn new<S>(config: OutboxConfig, store: Arc<S>) -> Self
    where
        S: OutboxStore + SeqStore + 'static,
    {
        Self::with_stores(config, store.clone(), store)
    }

    pub fn with_stores(
        config: OutboxConfig,
        outbox: Arc<dyn OutboxStore>,
        seq: Arc<dyn SeqStore>,
    ) -> Self {
        let pool = Arc::new(WorkerPool::start(config.pool));
        let router = Arc::new(
            EventRouter::builder()
                .store(outbox)
                .pool(pool.clone())
                .retry(config.retry)
                .build(),
        );
        let seq = Arc::new(SequenceAllocator::new(seq, config.seq));

        Self {
            config,
            seq,
            pool,
            router,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn pool_stats(&self) -> PoolSnapshot {
        self.pool.stats()
    }

    pub fn install(&self, module: &dyn EventModule) {
        module.install(self);
        tracing::info!(module = module.name(), "event module installed");
    }

    /// 在调用方事务内写入事件
    pub async fn event_begin<T>(&self, record: NewEventRecord, tx: &mut T) -> Result<i64, AppError>
    where
        T: OutboxTx + ?Sized,
    {
        Ok(self.router.event_begin(record, tx).await?)
    }

    /// 事务提交后触发分发
    pub async fn event_commit(&self, id: i64) -> DispatchOutcome {
        self.router.event_commit(id).await
    }

    pub fn register_handler(&self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.router.register_handler(kind, handler);
    }

    pub fn register_listener(&self, event: impl Into<String>, listener: Arc<dyn EventListener>) {
        self.router.register_listener(event, listener);
    }

    pub async fn gen_seq(&self, flag: &str) -> Result<i64, AppError> {
        Ok(self.seq.gen_seq(flag).await?)
    }

    fn sweeper(&self) -> Sweeper {
        Sweeper::builder()
            .router(self.router.clone())
            .config(self.config.sweeper)
            .build()
    }

    /// 启动周期补偿扫描；重复调用无效果
    pub fn start_sweeper(&self) {
        let mut slot = self.sweeper.lock();
        if slot.is_none() {
            *slot = Some(Arc::new(self.sweeper()).start());
            tracing::info!(interval = ?self.config.sweeper.interval, "event sweeper started");
        }
    }

    /// 立即执行一次补偿扫描
    pub async fn sweep_once(&self) -> Result<SweepReport, AppError> {
        Ok(self.sweeper().sweep_once().await?)
    }

    /// 停止扫描与调度池，并等待在途任务结束
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            handle.shutdown();
            handle.join().await;
        }
        self.pool.stop();
        self.pool.join().await;
        tracing::info!("event subsystem stopped");
    }
}
