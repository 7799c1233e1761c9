//! Webhook 传输 - 把消息文本 POST 到聊天 webhook
//!
//! 请求体：`{"username": "<bot 名>", "content": "<消息文本>"}`，任何 2xx 视为成功。

use reqwest::Client;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

/// 传输层返回的 boxed future
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// 单次投递失败原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// 连接/传输层错误
    Transport(String),
    /// 非 2xx 响应
    Status(u16),
    /// 超时
    Timeout,
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Transport(e) => write!(f, "transport error: {}", e),
            DeliveryError::Status(code) => write!(f, "unexpected HTTP status {}", code),
            DeliveryError::Timeout => write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for DeliveryError {}

/// 消息传输接口
pub trait WebhookTransport: Send + Sync {
    /// 发送一次，不做重试
    fn post<'a>(&'a self, content: &'a str) -> TransportFuture<'a>;
}

/// Webhook 请求载荷
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    /// 显示的 bot 名
    pub username: &'a str,
    /// 消息内容
    pub content: &'a str,
}

/// Discord 兼容的 webhook 客户端
#[derive(Debug, Clone)]
pub struct DiscordWebhook {
    client: Client,
    url: String,
    username: String,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>, username: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err("webhook_url is required".to_string());
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            url,
            username: username.into(),
        })
    }

    async fn post_once(&self, content: &str) -> Result<(), DeliveryError> {
        let payload = WebhookPayload {
            username: &self.username,
            content,
        };

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            info!(status = status.as_u16(), "Webhook delivery succeeded");
            Ok(())
        } else {
            debug!(status = status.as_u16(), "Webhook rejected message");
            Err(DeliveryError::Status(status.as_u16()))
        }
    }
}

impl WebhookTransport for DiscordWebhook {
    fn post<'a>(&'a self, content: &'a str) -> TransportFuture<'a> {
        Box::pin(self.post_once(content))
    }
}

/// 只记录日志、不发网络请求的传输（dry-run）
#[derive(Debug, Default, Clone)]
pub struct LogOnlyTransport;

impl WebhookTransport for LogOnlyTransport {
    fn post<'a>(&'a self, content: &'a str) -> TransportFuture<'a> {
        Box::pin(async move {
            info!(content = %content, "[DRY-RUN] Would post to webhook");
            Ok(())
        })
    }
}
