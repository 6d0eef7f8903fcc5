//! 调度池内部 FIFO 队列
//!
//! 互斥锁保护缓冲区，`Notify` 充当条件变量：`push` 唤醒，`pop` 在空队列上挂起。
//! 容量策略由 `QueuePolicy` 决定。
//!
use super::Job;
use crate::error::{DomainError, DomainResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// 队列溢出时的处理方式
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    /// 拒绝新任务，`submit` 返回 `DomainError::QueueFull`
    Reject,
    /// 丢弃最早排队的任务，为新任务腾位置
    DropOldest,
}

/// 队列容量策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueuePolicy {
    /// 不设上限，突发流量全部吸收（内存随积压增长）
    #[default]
    Unbounded,
    Bounded { capacity: usize, overflow: Overflow },
}

struct State {
    buffer: VecDeque<Job>,
    closed: bool,
}

pub(crate) struct JobQueue {
    state: Mutex<State>,
    popable: Notify,
    policy: QueuePolicy,
}

impl JobQueue {
    pub(crate) fn new(policy: QueuePolicy) -> Self {
        let policy = match policy {
            QueuePolicy::Bounded { capacity, overflow } => QueuePolicy::Bounded {
                capacity: capacity.max(1),
                overflow,
            },
            unbounded => unbounded,
        };
        Self {
            state: Mutex::new(State {
                buffer: VecDeque::new(),
                closed: false,
            }),
            popable: Notify::new(),
            policy,
        }
    }

    pub(crate) fn push(&self, job: Job) -> DomainResult<()> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(DomainError::PoolStopped);
            }
            if let QueuePolicy::Bounded { capacity, overflow } = self.policy {
                if state.buffer.len() >= capacity {
                    match overflow {
                        Overflow::Reject => return Err(DomainError::QueueFull { capacity }),
                        Overflow::DropOldest => {
                            if let Some(dropped) = state.buffer.pop_front() {
                                tracing::warn!(job = dropped.label(), capacity, "queue full, oldest job dropped");
                            }
                        }
                    }
                }
            }
            state.buffer.push_back(job);
        }
        self.popable.notify_one();
        Ok(())
    }

    /// 阻塞式取出；队列关闭后返回 `None`
    pub(crate) async fn pop(&self) -> Option<Job> {
        loop {
            let notified = self.popable.notified();
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(job) = state.buffer.pop_front() {
                    return Some(job);
                }
            }
            notified.await;
        }
    }

    /// 关闭队列，未取出的任务被放弃
    pub(crate) fn close(&self) -> usize {
        let abandoned = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.buffer).len()
        };
        self.popable.notify_waiters();
        self.popable.notify_one();
        abandoned
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(label: &str) -> Job {
        Job::new((), |_, _| async {}).labeled(label)
    }

    #[tokio::test]
    async fn fifo_order() {
        let q = JobQueue::new(QueuePolicy::Unbounded);
        q.push(noop("a")).unwrap();
        q.push(noop("b")).unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().await.unwrap().label(), "a");
        assert_eq!(q.pop().await.unwrap().label(), "b");
    }

    #[tokio::test]
    async fn bounded_reject() {
        let q = JobQueue::new(QueuePolicy::Bounded {
            capacity: 1,
            overflow: Overflow::Reject,
        });
        q.push(noop("a")).unwrap();
        let err = q.push(noop("b")).unwrap_err();
        assert!(matches!(err, DomainError::QueueFull { capacity: 1 }));
    }

    #[tokio::test]
    async fn bounded_drop_oldest() {
        let q = JobQueue::new(QueuePolicy::Bounded {
            capacity: 2,
            overflow: Overflow::DropOldest,
        });
        q.push(noop("a")).unwrap();
        q.push(noop("b")).unwrap();
        q.push(noop("c")).unwrap();
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().await.unwrap().label(), "b");
        assert_eq!(q.pop().await.unwrap().label(), "c");
    }

    #[tokio::test]
    async fn pop_wakes_on_push_and_close() {
        let q = std::sync::Arc::new(JobQueue::new(QueuePolicy::Unbounded));
        let popper = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await.map(|j| j.label().to_string()) })
        };
        tokio::task::yield_now().await;
        q.push(noop("late")).unwrap();
        assert_eq!(popper.await.unwrap().as_deref(), Some("late"));

        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.pop().await.is_none() })
        };
        tokio::task::yield_now().await;
        q.close();
        assert!(waiter.await.unwrap());
        assert!(matches!(q.push(noop("x")), Err(DomainError::PoolStopped)));
    }
}
