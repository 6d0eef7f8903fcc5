//! 有界调度池（WorkerPool）
//!
//! 固定数量的长驻 worker 在共享的“空闲”通道上报告可用；内部 FIFO 队列吸收突发提交；
//! 单个出队循环把下一个任务交给下一个空闲 worker：
//! - `submit` 从不等待 worker，仅按 `QueuePolicy` 入队；
//! - 每个 worker 同一时刻只执行一个任务，因此并发度恒不超过 `size`；
//! - `stop` 后 worker 执行完手上的任务即退出，队列中剩余任务被放弃
//!   （Outbox 才是事实来源，未执行的事件由 Sweeper 补偿）。
//!
mod job;
mod queue;
mod worker;

pub use job::{Job, WorkerId};
pub use queue::{Overflow, QueuePolicy};

use crate::error::{DomainError, DomainResult};
use parking_lot::Mutex;
use queue::JobQueue;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use worker::Worker;

/// 调度池配置
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// worker 数量
    pub size: usize,
    pub queue: QueuePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 100,
            queue: QueuePolicy::Unbounded,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PoolStats {
    submitted: AtomicU64,
    executing: AtomicUsize,
    completed: AtomicU64,
    panicked: AtomicU64,
}

/// 调度池运行状态快照
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// 累计提交
    pub submitted: u64,
    /// 正在执行
    pub executing: usize,
    /// 累计完成（含 panic）
    pub completed: u64,
    pub panicked: u64,
    /// 排队中
    pub queued: usize,
}

pub struct WorkerPool {
    size: usize,
    queue: Arc<JobQueue>,
    stats: Arc<PoolStats>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// 启动调度池（需在 tokio 运行时内调用）
    pub fn start(config: PoolConfig) -> Self {
        let size = config.size.max(1);
        let queue = Arc::new(JobQueue::new(config.queue));
        let stats = Arc::new(PoolStats::default());
        let token = CancellationToken::new();
        let (idle_tx, idle_rx) = mpsc::channel(size);

        let mut tasks = Vec::with_capacity(size + 1);
        tasks.push(tokio::spawn(Self::pop_loop(
            queue.clone(),
            idle_rx,
            token.clone(),
        )));
        for id in 1..=size {
            let worker = Worker::new(id, idle_tx.clone(), stats.clone(), token.clone());
            tasks.push(worker.start());
        }

        tracing::info!(size, queue = ?config.queue, "worker pool started");

        Self {
            size,
            queue,
            stats,
            token,
            tasks: Mutex::new(tasks),
        }
    }

    /// 出队循环：队首任务配对下一个空闲 worker
    async fn pop_loop(
        queue: Arc<JobQueue>,
        mut idle: mpsc::Receiver<mpsc::Sender<Job>>,
        token: CancellationToken,
    ) {
        loop {
            let job = tokio::select! {
                _ = token.cancelled() => break,
                job = queue.pop() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let worker = tokio::select! {
                _ = token.cancelled() => break,
                worker = idle.recv() => match worker {
                    Some(worker) => worker,
                    None => break,
                },
            };

            if worker.send(job).await.is_err() {
                break;
            }
        }
    }

    /// 入队一个任务；从不等待 worker 空闲
    pub fn submit(&self, job: Job) -> DomainResult<()> {
        if self.token.is_cancelled() {
            return Err(DomainError::PoolStopped);
        }
        self.queue.push(job)?;
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> PoolSnapshot {
        PoolSnapshot {
            submitted: self.stats.submitted.load(Ordering::SeqCst),
            executing: self.stats.executing.load(Ordering::SeqCst),
            completed: self.stats.completed.load(Ordering::SeqCst),
            panicked: self.stats.panicked.load(Ordering::SeqCst),
            queued: self.queue.len(),
        }
    }

    /// 队列深度
    pub fn waiting(&self) -> usize {
        self.queue.len()
    }

    /// 通知所有 worker 在当前任务结束后退出，丢弃排队任务
    pub fn stop(&self) {
        if self.token.is_cancelled() {
            return;
        }
        self.token.cancel();
        let abandoned = self.queue.close();
        tracing::info!(abandoned, "worker pool stopping");
    }

    /// 等待所有 worker 退出
    pub async fn join(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        let _ = tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::start(PoolConfig {
            size: 3,
            queue: QueuePolicy::Unbounded,
        });
        let gate = Arc::new(Semaphore::new(0));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..20 {
            let gate = gate.clone();
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(Job::new(i, move |_, _| async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let _permit = gate.acquire().await;
                running.fetch_sub(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        wait_until(|| pool.stats().executing == 3).await;
        let snapshot = pool.stats();
        assert_eq!(snapshot.submitted, 20);
        assert_eq!(snapshot.executing, 3);
        assert!(snapshot.queued >= 16);

        gate.add_permits(20);
        wait_until(|| pool.stats().completed == 20).await;

        assert_eq!(pool.stats().completed, 20);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        pool.stop();
        pool.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn job_receives_worker_id_and_data() {
        let pool = WorkerPool::start(PoolConfig {
            size: 2,
            ..Default::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        pool.submit(Job::new("payload".to_string(), move |worker, data| async move {
            let _ = tx.send((worker, data));
        }))
        .unwrap();

        let (worker, data) = rx.recv().await.unwrap();
        assert!((1..=2).contains(&worker));
        assert_eq!(data, "payload");
        pool.stop();
        pool.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panicking_job_does_not_kill_worker() {
        let pool = WorkerPool::start(PoolConfig {
            size: 1,
            ..Default::default()
        });
        pool.submit(Job::new((), |_, _| async { panic!("boom") }))
            .unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        pool.submit(Job::new((), move |_, _| async move {
            d.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        wait_until(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().panicked, 1);
        pool.stop();
        pool.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn panic_while_building_future_is_contained() {
        let pool = WorkerPool::start(PoolConfig {
            size: 1,
            ..Default::default()
        });
        // 闭包在返回 future 之前就 panic
        pool.submit(Job::new((), |_, _| -> std::future::Ready<()> {
            panic!("boom before future")
        }))
        .unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        pool.submit(Job::new((), move |_, _| async move {
            d.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        wait_until(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        let snapshot = pool.stats();
        assert_eq!(snapshot.panicked, 1);
        assert_eq!(snapshot.completed, 2);
        pool.stop();
        pool.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_finishes_in_flight_and_abandons_queue() {
        let pool = WorkerPool::start(PoolConfig {
            size: 1,
            ..Default::default()
        });
        let gate = Arc::new(Semaphore::new(0));
        let finished = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let gate = gate.clone();
            let finished = finished.clone();
            pool.submit(Job::new((), move |_, _| async move {
                let _permit = gate.acquire().await;
                finished.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        wait_until(|| pool.stats().executing == 1).await;

        pool.stop();
        assert!(matches!(
            pool.submit(Job::new((), |_, _| async {})),
            Err(DomainError::PoolStopped)
        ));
        gate.add_permits(3);
        pool.join().await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(pool.waiting(), 0);
    }
}
