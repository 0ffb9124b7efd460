//! Webhook 客户端 - 通过 HTTP POST 发送告警
//!
//! 请求体为 `{"content": "<正文>"}`，带 `Content-Type: application/json`。
//! 每次请求都受固定超时约束，对端挂起不会阻塞调用方。
//!
//! 注意：这里使用 reqwest 的 blocking 客户端，不能在 async 上下文中创建或销毁，
//! daemon 通过 `spawn_blocking` 调用。

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::payload::compose;
use super::{Outcome, Transport};
use crate::alert::Alert;
use crate::config::validate_webhook_url;

/// 默认超时（秒）
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Webhook 配置
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Webhook URL
    pub url: String,
    /// 单次请求超时
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Webhook 请求载荷
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Webhook 发送实现
#[derive(Debug)]
pub struct WebhookTransport {
    client: Client,
    config: WebhookConfig,
}

impl WebhookTransport {
    /// 创建客户端；URL 不合法时报错
    pub fn new(config: WebhookConfig) -> Result<Self> {
        validate_webhook_url(&config.url)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }
}

impl Transport for WebhookTransport {
    fn send(&self, alert: &Alert) -> Outcome {
        let message = compose(alert);
        if message.truncated {
            warn!(
                host = %alert.host,
                severity = %alert.severity,
                "Alert body exceeded webhook limit, truncated"
            );
        }

        let payload = WebhookPayload {
            content: &message.content,
        };

        let response = match self
            .client
            .post(&self.config.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
        {
            Ok(response) => response,
            Err(e) => {
                let outcome = classify_error(&e);
                warn!(host = %alert.host, outcome = %outcome, "Webhook request failed");
                return outcome;
            }
        };

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let outcome = classify_status(response.status(), retry_after);

        match &outcome {
            Outcome::Delivered => info!(
                host = %alert.host,
                severity = %alert.severity,
                status = response.status().as_u16(),
                "Alert sent successfully"
            ),
            other => warn!(
                host = %alert.host,
                severity = %alert.severity,
                outcome = %other,
                "Alert delivery failed"
            ),
        }
        outcome
    }
}

/// 状态码归类
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Outcome {
    if status.is_success() {
        Outcome::Delivered
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Outcome::RateLimited { retry_after }
    } else {
        Outcome::HttpError(status.as_u16())
    }
}

fn classify_error(e: &reqwest::Error) -> Outcome {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        Outcome::NetworkError(e.to_string())
    } else {
        debug!(error = ?e, "Unclassified webhook error");
        Outcome::Unexpected(e.to_string())
    }
}

/// Retry-After 只支持秒数形式
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<f64>().ok().filter(|s| (0.0..1e9).contains(s)).map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeout_is_10s() {
        let config = WebhookConfig::new("https://example.com/hook");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_invalid_url() {
        let result = WebhookTransport::new(WebhookConfig::new("not-a-url"));
        assert!(result.is_err());
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::OK, None), Outcome::Delivered);
        assert_eq!(classify_status(StatusCode::NO_CONTENT, None), Outcome::Delivered);
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(2))),
            Outcome::RateLimited {
                retry_after: Some(Duration::from_secs(2))
            }
        );
        assert_eq!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, None),
            Outcome::HttpError(503)
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }
}
