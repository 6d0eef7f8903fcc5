//! 事件子系统（eventing）
//!
//! 在 Outbox 之上提供分发与补偿：
//! - `EventHandler`：编译期已知事件（`EventKind`）的唯一处理者；
//! - `EventListener` / `EventCommitter`：按事件名动态订阅、需显式提交结果的监听者；
//! - `EventRouter`：事务内写入、提交后分发、以乐观锁写回终态；
//! - `Sweeper`：周期重投漏投递或待重试的事件；
//! - `RetryPolicy`：失败后的重试次数与退避。
//!
//! 投递语义为至少一次，重复投递由 `version_lock` 条件更新吸收。
//!
mod finalize;
pub mod handler;
pub mod listener;
pub mod retry;
pub mod router;
pub mod sweeper;

pub use handler::{EventHandler, FnHandler, handler_fn};
pub use listener::{EventCommitter, EventListener, FnListener, listener_fn};
pub use retry::{Backoff, RetryPolicy};
pub use router::{DispatchOutcome, EventRouter};
pub use sweeper::{SweepReport, Sweeper, SweeperConfig, SweeperHandle};
