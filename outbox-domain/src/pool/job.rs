use futures_util::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// 执行任务的 worker 编号（从 1 开始）
pub type WorkerId = usize;

type JobFn = Box<dyn FnOnce(WorkerId) -> BoxFuture<'static, ()> + Send>;

/// 提交给 `WorkerPool` 的任务：一份数据 + 接收 worker 编号与数据的函数
pub struct Job {
    label: String,
    run: JobFn,
}

impl Job {
    pub fn new<D, F, Fut>(data: D, f: F) -> Self
    where
        D: Send + 'static,
        F: FnOnce(WorkerId, D) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            label: String::new(),
            // 闭包在 future 内部调用，同步阶段的 panic 也由 worker 捕获
            run: Box::new(move |worker| Box::pin(async move { f(worker, data).await })),
        }
    }

    /// 附带一个用于日志的标签
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn run(self, worker: WorkerId) -> BoxFuture<'static, ()> {
        (self.run)(worker)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("label", &self.label).finish()
    }
}
