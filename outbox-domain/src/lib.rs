//! 事务型事件 Outbox 核心库（outbox-domain）
//!
//! 为聊天后端提供“随业务事务一起落盘、提交后异步投递”的事件基础设施：
//! - 事件记录与已知事件目录（`event`）
//! - Outbox 与号段表的持久化协议及内存/Postgres 实现（`persist`）
//! - 有界调度池（`pool`）：固定数量 worker，提交从不阻塞请求路径
//! - 路由、监听、重试与补偿扫描（`eventing`）
//! - 号段式序列号分配（`seq`）
//!
//! 典型用法：
//! 1. 开启业务事务，调用 `EventRouter::event_begin` 在同一事务内写入事件；
//! 2. 完成业务写入并提交事务；
//! 3. 调用 `EventRouter::event_commit`，事件交由调度池中的处理器执行；
//! 4. 启动 `Sweeper`，兜底重投提交后未能分发的事件。
//!
pub mod error;
pub mod event;
pub mod eventing;
pub mod persist;
pub mod pool;
pub mod seq;
