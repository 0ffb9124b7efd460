//! 告警模型 - 严重级别与告警内容
//!
//! 严重级别决定冷却键的第一维，也决定消息标题的样式：
//! - CRITICAL: 入侵确认、关键文件被篡改
//! - WARNING: 可疑行为，需要人工确认
//! - INFO: 记录性事件

use serde::{Deserialize, Serialize};

/// 告警严重级别
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Severity {
    /// 小写形式，用于文件名和 JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Severity::Critical => "🚨",
            Severity::Warning => "⚠️",
            Severity::Info => "ℹ️",
        }
    }
}

/// 一条待发送的告警
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// 严重级别
    pub severity: Severity,
    /// 事件描述
    pub message: String,
    /// 事件发生的主机
    pub host: String,
    /// 附加详情（日志片段、命令等）
    #[serde(default)]
    pub details: Option<String>,
}

impl Alert {
    /// 创建告警
    pub fn new(severity: Severity, message: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            host: host.into(),
            details: None,
        }
    }

    /// 设置详情
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
