//! 运行配置（OutboxConfig）
//!
//! 汇总调度池、补偿扫描、重试与号段分配的参数。默认值即生产默认值；
//! `from_env` 读取环境变量覆盖其中一部分：
//!
//! | 变量 | 含义 | 默认 |
//! |---|---|---|
//! | `EVENT_POOL_SIZE` | worker 数量 | 100 |
//! | `EVENT_QUEUE_CAPACITY` | 队列容量，`0` 表示不设上限 | 0 |
//! | `EVENT_QUEUE_OVERFLOW` | `reject` 或 `drop_oldest` | `reject` |
//! | `EVENT_SWEEP_INTERVAL_SECS` | 补偿扫描间隔 | 60 |
//! | `EVENT_SWEEP_LIMIT` | 单次扫描上限 | 1000 |
//! | `EVENT_PENDING_GRACE_SECS` | 视为漏投递的宽限期 | 60 |
//! | `EVENT_MAX_ATTEMPTS` | 含首次的最大执行次数 | 3 |
//! | `SEQ_STEP` | 号段大小 | 1000 |
//!
use crate::error::AppError;
use bon::Builder;
use outbox_domain::eventing::{RetryPolicy, SweeperConfig};
use outbox_domain::pool::{Overflow, PoolConfig, QueuePolicy};
use outbox_domain::seq::SeqConfig;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Builder)]
pub struct OutboxConfig {
    #[builder(default)]
    pub pool: PoolConfig,
    #[builder(default)]
    pub sweeper: SweeperConfig,
    #[builder(default)]
    pub retry: RetryPolicy,
    #[builder(default)]
    pub seq: SeqConfig,
}

impl OutboxConfig {
    /// 从进程环境读取
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源读取，未设置的键保留默认值
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Some(size) = parse::<usize>(&lookup, "EVENT_POOL_SIZE")? {
            config.pool.size = size;
        }

        let overflow = match lookup("EVENT_QUEUE_OVERFLOW").as_deref().map(str::trim) {
            None | Some("") | Some("reject") => Overflow::Reject,
            Some("drop_oldest") => Overflow::DropOldest,
            Some(other) => {
                return Err(AppError::Config {
                    key: "EVENT_QUEUE_OVERFLOW",
                    value: other.to_string(),
                    reason: "expected reject or drop_oldest".to_string(),
                });
            }
        };
        config.pool.queue = match parse::<usize>(&lookup, "EVENT_QUEUE_CAPACITY")? {
            None | Some(0) => QueuePolicy::Unbounded,
            Some(capacity) => QueuePolicy::Bounded { capacity, overflow },
        };

        if let Some(secs) = parse::<u64>(&lookup, "EVENT_SWEEP_INTERVAL_SECS")? {
            config.sweeper.interval = Duration::from_secs(secs.max(1));
        }
        if let Some(limit) = parse::<usize>(&lookup, "EVENT_SWEEP_LIMIT")? {
            config.sweeper.limit = limit;
        }
        if let Some(secs) = parse::<u64>(&lookup, "EVENT_PENDING_GRACE_SECS")? {
            config.sweeper.grace = Duration::from_secs(secs);
        }
        if let Some(max) = parse::<u32>(&lookup, "EVENT_MAX_ATTEMPTS")? {
            config.retry.max_attempts = max.max(1);
        }
        if let Some(step) = parse::<i64>(&lookup, "SEQ_STEP")? {
            config.seq.step = step;
        }

        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|e| AppError::Config {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
