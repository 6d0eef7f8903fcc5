//! Outbox 事件模型（event）
//!
//! - `EventRecord`：`event` 表中的一行，携带状态机与乐观锁；
//! - `NewEventRecord`：业务事务内写入的事件意图；
//! - `EventKind`：编译期已知的事件目录。
//!
mod kind;
mod record;

pub use kind::EventKind;
pub use record::{EventRecord, EventStatus, EventType, NewEventRecord};
