//! 号段式序列号分配器（SequenceAllocator）
//!
//! 为每个逻辑计数器（flag，如 `group`、`groupMember`、`user`）发放严格递增的 `i64`：
//! - 一次向存储预留 `step` 个号，之后在内存中发放，摊薄数据库往返；
//! - 预留由存储原子完成（`min_seq += step` 并返回新上界），进程只拥有
//!   `(上界 - step, 上界]` 这一段，多个进程共享同一数据库时各自拿到互不相交的号段；
//! - 重启后重新预留，不会复用旧号（未发完的号作废）；
//! - 当前号段用尽时先完成预留，再发放新号段中的号；预留按 flag 串行。
//!
use crate::error::{DomainError, DomainResult};
use crate::persist::SeqStore;
use dashmap::DashMap;
use std::sync::Arc;

/// 首次初始化时的起始偏移，避开历史编号
pub const DEFAULT_SEQ_BASE: i64 = 1_000_000;
/// 默认号段大小
pub const DEFAULT_SEQ_STEP: i64 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeqConfig {
    pub base: i64,
    pub step: i64,
}

impl Default for SeqConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_SEQ_BASE,
            step: DEFAULT_SEQ_STEP,
        }
    }
}

/// 已发放到的号与本进程持有的上界；`cur == max` 表示号段耗尽
#[derive(Default)]
struct Range {
    cur: i64,
    max: i64,
}

/// 单个 flag 的内存号段
#[derive(Default)]
struct Segment {
    range: parking_lot::Mutex<Range>,
    reserve: tokio::sync::Mutex<()>,
}

impl Segment {
    fn take(&self) -> Option<i64> {
        let mut range = self.range.lock();
        if range.cur < range.max {
            range.cur += 1;
            Some(range.cur)
        } else {
            None
        }
    }

    fn adopt(&self, upper: i64, step: i64) {
        let mut range = self.range.lock();
        range.cur = upper - step;
        range.max = upper;
    }
}

fn seq_key(flag: &str) -> String {
    format!("seq:{flag}")
}

pub struct SequenceAllocator {
    store: Arc<dyn SeqStore>,
    config: SeqConfig,
    segments: DashMap<String, Arc<Segment>>,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn SeqStore>, config: SeqConfig) -> Self {
        Self {
            store,
            config: SeqConfig {
                step: config.step.max(1),
                ..config
            },
            segments: DashMap::new(),
        }
    }

    pub fn config(&self) -> SeqConfig {
        self.config
    }

    /// 发放下一个序号
    ///
    /// 预留号段失败时返回 `DomainError::Sequence`，调用方必须放弃本次请求：
    /// 没有任何安全的号可以代替返回。
    pub async fn gen_seq(&self, flag: &str) -> DomainResult<i64> {
        let segment = self.segment(flag);
        loop {
            if let Some(seq) = segment.take() {
                return Ok(seq);
            }

            let _guard = segment.reserve.lock().await;
            // 等锁期间可能已有其它调用方完成预留
            if let Some(seq) = segment.take() {
                return Ok(seq);
            }
            let upper = self.reserve(flag).await?;
            segment.adopt(upper, self.config.step);
        }
    }

    fn segment(&self, flag: &str) -> Arc<Segment> {
        if let Some(segment) = self.segments.get(flag) {
            return Arc::clone(segment.value());
        }
        Arc::clone(self.segments.entry(flag.to_string()).or_default().value())
    }

    async fn reserve(&self, flag: &str) -> DomainResult<i64> {
        let SeqConfig { base, step } = self.config;
        let upper = self
            .store
            .reserve_seq(&seq_key(flag), step, base)
            .await
            .map_err(|e| {
                tracing::error!(flag, step, error = %e, "sequence reservation failed");
                DomainError::sequence(flag, e.to_string())
            })?;
        tracing::debug!(flag, min_seq = upper, "sequence segment reserved");
        Ok(upper)
    }
}
