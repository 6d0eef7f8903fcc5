//! 通知出口（NotificationSink）
//!
//! 处理器把副作用发往 IM 引擎的唯一通道：`send(endpoint, payload)`。
//! - `HttpSink`：以 JSON POST 到 `base_url + endpoint`，非 2xx 视为失败；
//!   400 响应体中的 `msg` 字段会带入错误原因；
//! - `LogSink`：仅记录日志并保留发送历史，用于本地运行与测试。
//!
use crate::error::AppError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

/// 成功响应
#[derive(Clone, Debug, PartialEq)]
pub struct SinkResponse {
    pub status: u16,
    /// 响应体中的 `data` 字段（若有）
    pub data: Value,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, endpoint: &str, payload: &Value) -> Result<SinkResponse, AppError>;
}

pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for HttpSink {
    async fn send(&self, endpoint: &str, payload: &Value) -> Result<SinkResponse, AppError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let resp = self.client.post(&url).json(payload).send().await?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            let reason = body
                .get("msg")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("unexpected status {}", status.as_u16()));
            tracing::warn!(%url, status = status.as_u16(), %reason, "im engine rejected request");
            return Err(AppError::Sink {
                status: status.as_u16(),
                reason,
            });
        }

        Ok(SinkResponse {
            status: status.as_u16(),
            data: body.get("data").cloned().unwrap_or(Value::Null),
        })
    }
}

/// 只记录、不外发
#[derive(Default)]
pub struct LogSink {
    sent: Mutex<Vec<(String, Value)>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发送的 (endpoint, payload)
    pub fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, endpoint: &str, payload: &Value) -> Result<SinkResponse, AppError> {
        tracing::info!(endpoint, %payload, "notification");
        self.sent.lock().push((endpoint.to_string(), payload.clone()));
        Ok(SinkResponse {
            status: 200,
            data: Value::Null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
    }

    /// 单次应答的本地 HTTP 服务，返回基地址与收到的原始请求
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(end) = header_end(&buf) {
                    let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if buf.len() >= end + len {
                        break;
                    }
                }
            }

            let resp = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(resp.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&buf).to_string()
        });
        (format!("http://{addr}/"), task)
    }

    #[tokio::test]
    async fn http_sink_posts_json_and_returns_data() {
        let (base, server) =
            serve_once("200 OK", r#"{"status":200,"data":{"message_id":42}}"#).await;
        let sink = HttpSink::new(base, Duration::from_secs(5)).unwrap();

        let resp = sink
            .send("/message/send", &json!({"channel_id": "g1"}))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.data, json!({"message_id": 42}));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /message/send HTTP/1.1"));
        assert!(request.contains(r#"{"channel_id":"g1"}"#));
    }

    #[tokio::test]
    async fn http_sink_reports_bad_request_msg() {
        let (base, server) = serve_once("400 Bad Request", r#"{"msg":"group not found"}"#).await;
        let sink = HttpSink::new(base, Duration::from_secs(5)).unwrap();

        let err = sink
            .send("/message/send", &json!({"channel_id": "missing"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Sink { status: 400, ref reason } if reason == "group not found"
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn http_sink_treats_other_status_as_failure() {
        let (base, server) = serve_once("500 Internal Server Error", "").await;
        let sink = HttpSink::new(base, Duration::from_secs(5)).unwrap();

        let err = sink.send("/message/send", &json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Sink { status: 500, ref reason } if reason.contains("500")
        ));
        server.await.unwrap();
    }
}
