//! IM 通知消息与内置处理器
//!
//! 事件负载到 IM 引擎 `/message/send` 请求体的转换，以及建群通知处理器。
//!
use crate::sink::NotificationSink;
use async_trait::async_trait;
use outbox_domain::event::EventRecord;
use outbox_domain::eventing::EventHandler;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

pub const MESSAGE_SEND_ENDPOINT: &str = "/message/send";
pub const CHANNEL_TYPE_PERSON: u8 = 1;
pub const CHANNEL_TYPE_GROUP: u8 = 2;
/// 建群提示
pub const CONTENT_GROUP_CREATE: i32 = 1001;
/// 命令消息
pub const CONTENT_CMD: i32 = 99;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UserBase {
    pub uid: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, Default, Serialize, PartialEq)]
pub struct MessageHeader {
    pub no_persist: u8,
    pub red_dot: u8,
    pub sync_once: u8,
}

/// `/message/send` 请求体
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct MessageRequest {
    pub header: MessageHeader,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub from_uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subscribers: Vec<String>,
    pub payload: Value,
}

/// `group.create` 事件负载
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupCreatePayload {
    pub creator: String,
    pub creator_name: String,
    pub group_no: String,
    pub version: i64,
    #[serde(default)]
    pub members: Vec<UserBase>,
}

impl GroupCreatePayload {
    /// 建群提示：“{creator}邀请{0},{1}加入群聊”，占位符按 `extra` 中的成员顺序展开
    pub fn to_message(&self) -> MessageRequest {
        let invited: Vec<&UserBase> = self
            .members
            .iter()
            .filter(|m| m.uid != self.creator)
            .collect();
        let params: Vec<String> = (0..invited.len()).map(|i| format!("{{{i}}}")).collect();
        let content = format!("{}邀请{}加入群聊", self.creator_name, params.join(","));

        MessageRequest {
            header: MessageHeader {
                no_persist: 0,
                red_dot: 1,
                sync_once: 0,
            },
            from_uid: String::new(),
            channel_id: self.group_no.clone(),
            channel_type: CHANNEL_TYPE_GROUP,
            subscribers: Vec::new(),
            payload: json!({
                "creator": self.creator,
                "creator_name": self.creator_name,
                "content": content,
                "version": self.version,
                "extra": invited,
                "type": CONTENT_GROUP_CREATE,
            }),
        }
    }
}

/// 命令消息（不在会话列表中展示）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CmdRequest {
    pub from_uid: String,
    pub channel_id: String,
    pub channel_type: u8,
    pub cmd: String,
    pub param: Option<Value>,
    pub no_persist: bool,
    pub subscribers: Vec<String>,
}

impl CmdRequest {
    pub fn to_message(&self) -> MessageRequest {
        let mut payload = json!({
            "cmd": self.cmd,
            "type": CONTENT_CMD,
        });
        if let (Some(param), Some(obj)) = (&self.param, payload.as_object_mut()) {
            obj.insert("param".to_string(), param.clone());
        }

        MessageRequest {
            header: MessageHeader {
                no_persist: u8::from(self.no_persist),
                red_dot: 0,
                sync_once: 1,
            },
            from_uid: self.from_uid.clone(),
            channel_id: self.channel_id.clone(),
            channel_type: self.channel_type,
            subscribers: self.subscribers.clone(),
            payload,
        }
    }
}

/// 把命令消息发往 IM 引擎
pub async fn send_cmd(sink: &dyn NotificationSink, req: &CmdRequest) -> anyhow::Result<()> {
    let body = serde_json::to_value(req.to_message())?;
    sink.send(MESSAGE_SEND_ENDPOINT, &body).await?;
    Ok(())
}

/// `group.create` 处理器：向新群发送建群提示
pub struct GroupCreateNotifier {
    sink: Arc<dyn NotificationSink>,
}

impl GroupCreateNotifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl EventHandler for GroupCreateNotifier {
    fn handler_name(&self) -> &str {
        "group.create.notifier"
    }

    async fn handle(&self, event: &EventRecord) -> anyhow::Result<()> {
        let payload: GroupCreatePayload = event.payload()?;
        let body = serde_json::to_value(payload.to_message())?;
        self.sink.send(MESSAGE_SEND_ENDPOINT, &body).await?;
        Ok(())
    }
}
