use super::{Job, PoolStats, WorkerId};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 空闲 worker 在共享通道上投递自己的任务入口
pub(crate) type IdleSender = mpsc::Sender<mpsc::Sender<Job>>;

/// 长驻 worker：每次只执行一个任务，执行完毕后重新报告空闲
pub(crate) struct Worker {
    id: WorkerId,
    idle: IdleSender,
    stats: Arc<PoolStats>,
    token: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        idle: IdleSender,
        stats: Arc<PoolStats>,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            idle,
            stats,
            token,
        }
    }

    pub(crate) fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let (job_tx, mut job_rx) = mpsc::channel::<Job>(1);

        loop {
            if self.idle.send(job_tx.clone()).await.is_err() {
                break;
            }

            let job = tokio::select! {
                _ = self.token.cancelled() => break,
                job = job_rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            self.execute(job).await;
        }

        tracing::debug!(worker_id = self.id, "worker stopped");
    }

    async fn execute(&self, job: Job) {
        self.stats.executing.fetch_add(1, Ordering::SeqCst);
        let label = job.label().to_string();

        if AssertUnwindSafe(job.run(self.id)).catch_unwind().await.is_err() {
            self.stats.panicked.fetch_add(1, Ordering::SeqCst);
            tracing::error!(worker_id = self.id, job = %label, "job panicked");
        }

        self.stats.executing.fetch_sub(1, Ordering::SeqCst);
        self.stats.completed.fetch_add(1, Ordering::SeqCst);
    }
}
