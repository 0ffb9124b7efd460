//! 发送层 - 把一条告警 POST 到 webhook，并把结果归类
//!
//! 结果分类（`Outcome`）决定队列里记录的失败原因：
//! - `Delivered` → 成功
//! - `RateLimited` → `rate_limited`
//! - `HttpError(503)` → `http_503`
//! - `NetworkError` → `network_error`
//! - `Unexpected` → `exception`

pub mod payload;
pub mod webhook;

use std::time::Duration;

use crate::alert::Alert;

pub use payload::{compose, compose_at, ComposedMessage, DETAILS_BYTE_BUDGET, MAX_CONTENT_CHARS};
pub use webhook::{WebhookConfig, WebhookTransport};

/// 单次发送的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 对端已接收
    Delivered,
    /// 429，对端要求稍后重试
    RateLimited { retry_after: Option<Duration> },
    /// 非 2xx 状态码
    HttpError(u16),
    /// 连接失败、超时等
    NetworkError(String),
    /// 其他错误
    Unexpected(String),
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered)
    }

    /// 写入队列条目的失败原因
    pub fn failure_reason(&self) -> String {
        match self {
            Outcome::Delivered => "delivered".to_string(),
            Outcome::RateLimited { .. } => "rate_limited".to_string(),
            Outcome::HttpError(code) => format!("http_{}", code),
            Outcome::NetworkError(_) => "network_error".to_string(),
            Outcome::Unexpected(_) => "exception".to_string(),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Delivered => write!(f, "delivered"),
            Outcome::RateLimited {
                retry_after: Some(after),
            } => write!(f, "rate limited (retry after {}s)", after.as_secs()),
            Outcome::RateLimited { retry_after: None } => write!(f, "rate limited"),
            Outcome::HttpError(code) => write!(f, "HTTP {}", code),
            Outcome::NetworkError(detail) => write!(f, "network error: {}", detail),
            Outcome::Unexpected(detail) => write!(f, "unexpected error: {}", detail),
        }
    }
}

/// 告警发送渠道
pub trait Transport: Send + Sync {
    /// 发送一条告警；不返回错误，所有失败都归类为 `Outcome`
    fn send(&self, alert: &Alert) -> Outcome;
}
