//! 领域层统一错误定义
//!
//! 聚焦序列化、Outbox 持久化、序列号分配与调度池等最小必要集合，
//! 便于在各实现层统一转换为 `DomainError`。
//!
use thiserror::Error;

/// 统一错误类型（基础库最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 序列化 ---
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },
    #[error("parse error: {reason}")]
    Parse { reason: String },

    // --- 仓储/持久化 ---
    #[error("database error: {reason}")]
    Database { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },

    // --- 序列号 ---
    #[error("sequence reservation failed: flag={flag}, reason={reason}")]
    Sequence { flag: String, reason: String },

    // --- 调度池 ---
    #[error("worker pool queue is full: capacity={capacity}")]
    QueueFull { capacity: usize },
    #[error("worker pool stopped")]
    PoolStopped,

    // --- 通用 ---
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

impl DomainError {
    pub fn database(reason: impl Into<String>) -> Self {
        DomainError::Database {
            reason: reason.into(),
        }
    }

    pub fn sequence(flag: &str, reason: impl Into<String>) -> Self {
        DomainError::Sequence {
            flag: flag.to_string(),
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx/chrono 等错误转换为 DomainError

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::NotFound {
                reason: "row not found".to_string(),
            },
            other => DomainError::Database {
                reason: other.to_string(),
            },
        }
    }
}

impl From<chrono::OutOfRangeError> for DomainError {
    fn from(err: chrono::OutOfRangeError) -> Self {
        DomainError::InvalidValue {
            reason: err.to_string(),
        }
    }
}
