//! Outbox 记录模型（EventRecord）
//!
//! 定义 `event` 表的一行在领域层的形态：事件标识、负载分类、状态机与乐观锁。
//!
use super::EventKind;
use crate::error::{DomainError, DomainResult};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// 事件负载分类，对通用消费者可见，对调度机制透明
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[default]
    None,
    Message,
    Cmd,
}

impl EventType {
    pub fn as_i16(self) -> i16 {
        match self {
            EventType::None => 0,
            EventType::Message => 1,
            EventType::Cmd => 2,
        }
    }
}

impl TryFrom<i16> for EventType {
    type Error = DomainError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::None),
            1 => Ok(EventType::Message),
            2 => Ok(EventType::Cmd),
            other => Err(DomainError::InvalidValue {
                reason: format!("unknown event type: {other}"),
            }),
        }
    }
}

/// 事件生命周期：`Wait -> {Success, Fail}`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    #[default]
    Wait,
    Success,
    Fail,
}

impl EventStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            EventStatus::Wait => 0,
            EventStatus::Success => 1,
            EventStatus::Fail => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, EventStatus::Wait)
    }
}

impl TryFrom<i16> for EventStatus {
    type Error = DomainError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventStatus::Wait),
            1 => Ok(EventStatus::Success),
            2 => Ok(EventStatus::Fail),
            other => Err(DomainError::InvalidValue {
                reason: format!("unknown event status: {other}"),
            }),
        }
    }
}

/// 待写入 Outbox 的事件意图（`EventBegin` 入参）
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct NewEventRecord {
    /// 事件标识，决定由哪个处理器执行（如 `group.create`）
    #[builder(into)]
    event: String,
    #[builder(default)]
    event_type: EventType,
    /// 序列化后的负载（JSON 文本）
    #[builder(into, default = String::from("{}"))]
    data: String,
}

impl NewEventRecord {
    /// 以可序列化负载构造事件意图
    pub fn with_payload<T: Serialize>(
        event: impl Into<String>,
        event_type: EventType,
        payload: &T,
    ) -> DomainResult<Self> {
        Ok(Self {
            event: event.into(),
            event_type,
            data: serde_json::to_string(payload)?,
        })
    }

    /// 针对编译期已知事件的便捷构造
    pub fn for_kind<T: Serialize>(
        kind: EventKind,
        event_type: EventType,
        payload: &T,
    ) -> DomainResult<Self> {
        Self::with_payload(kind.as_str(), event_type, payload)
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }
}

/// `event` 表的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: i64,
    pub event: String,
    pub event_type: EventType,
    pub data: String,
    pub status: EventStatus,
    /// 仅在失败（或等待重试）时填充
    pub reason: String,
    /// 乐观锁：每次状态写入都会递增
    pub version_lock: i64,
    /// 已失败的执行次数
    pub attempts: i32,
    /// 未到该时间前 Sweeper 不会重投
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    /// 由事件意图生成一条 `Wait` 状态的新记录
    pub fn pending(id: i64, new: NewEventRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            event: new.event,
            event_type: new.event_type,
            data: new.data,
            status: EventStatus::Wait,
            reason: String::new(),
            version_lock: 0,
            attempts: 0,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 事件名对应的已知事件；动态事件（仅监听者可见）返回 `None`
    pub fn kind(&self) -> Option<EventKind> {
        self.event.parse().ok()
    }

    /// 反序列化负载
    pub fn payload<T: DeserializeOwned>(&self) -> DomainResult<T> {
        Ok(serde_json::from_str(&self.data)?)
    }

    pub fn is_pending(&self) -> bool {
        self.status == EventStatus::Wait
    }
}
