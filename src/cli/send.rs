// src/cli/send.rs
//! Send 命令 - 发送一条入侵检测告警
//!
//! 送达或被冷却抑制返回 0，发送失败并入队返回 1，参数缺失由 clap 返回 2。

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tracing::error;

use crate::alert::{Alert, Severity};
use crate::config::Settings;
use crate::queue::AlertQueue;
use crate::sender::{AlertSender, SendOutcome, SendRequest};
use crate::transport::{Outcome, WebhookConfig, WebhookTransport};

/// Send 命令参数
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Webhook URL
    #[arg(long)]
    pub webhook: String,

    /// 告警级别
    #[arg(long, value_enum, default_value_t = Severity::Warning)]
    pub severity: Severity,

    /// 告警内容
    #[arg(long, required_unless_present = "retry")]
    pub message: Option<String>,

    /// 事件发生的主机
    #[arg(long, required_unless_present = "retry")]
    pub host: Option<String>,

    /// 附加详情（日志、命令等）
    #[arg(long)]
    pub details: Option<String>,

    /// 冷却时间（秒），默认 300
    #[arg(long)]
    pub cooldown: Option<u64>,

    /// 跳过冷却立即发送
    #[arg(long)]
    pub force: bool,

    /// 处理完后重试队列中的告警
    #[arg(long)]
    pub retry: bool,
}

impl SendArgs {
    fn request(&self, settings: &Settings) -> Option<SendRequest> {
        let message = self.message.clone()?;
        let host = self.host.clone()?;

        let mut alert = Alert::new(self.severity, message, host);
        if let Some(details) = &self.details {
            alert = alert.with_details(details.clone());
        }

        let cooldown = self.cooldown.unwrap_or(settings.default_cooldown_secs);
        Some(SendRequest::new(alert, cooldown).with_force(self.force))
    }
}

/// 处理 send 命令，返回退出码
pub fn handle_send(args: SendArgs, settings: &Settings) -> Result<u8> {
    let transport = match WebhookTransport::new(WebhookConfig::new(&args.webhook)) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            // URL 不可用时直接入队，由 daemon 用配置的 URL 重发
            if let Some(request) = args.request(settings) {
                let reason = Outcome::Unexpected(e.to_string()).failure_reason();
                let entry_id = AlertQueue::new(&settings.queue_dir)
                    .enqueue(&request.alert, &reason)
                    .context("failed to queue alert after webhook setup error")?;
                error!(entry_id = %entry_id, error = %e, "Webhook unusable, alert queued for retry");
                eprintln!("Alert failed ({}), queued for retry: {}", e, entry_id);
            }
            return Err(e);
        }
    };
    let sender = AlertSender::new(settings, transport);

    let mut exit_code = 0;
    if let Some(request) = args.request(settings) {
        let outcome = sender.send(&request)?;
        match &outcome {
            SendOutcome::Delivered => println!("Alert sent successfully"),
            SendOutcome::Suppressed { remaining_secs } => {
                eprintln!("Alert suppressed (cooldown active, {}s remaining)", remaining_secs)
            }
            SendOutcome::Queued { entry_id, outcome } => {
                eprintln!("Alert failed ({}), queued for retry: {}", outcome, entry_id)
            }
        }
        exit_code = outcome.exit_code();
    }

    if args.retry {
        let report = sender.retry_queued()?;
        println!(
            "Retried queued alerts: {} delivered, {} failed ({} archived)",
            report.delivered, report.failed, report.archived
        );
    }

    Ok(exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        send: SendArgs,
    }

    #[test]
    fn test_parse_full_args() {
        let cli = TestCli::try_parse_from([
            "test", "--webhook", "https://example.com/hook", "--severity", "critical",
            "--message", "disk full", "--host", "hostA", "--cooldown", "60", "--force",
        ])
        .unwrap();

        assert_eq!(cli.send.severity, Severity::Critical);
        assert_eq!(cli.send.cooldown, Some(60));
        assert!(cli.send.force);

        let request = cli.send.request(&Settings::default()).unwrap();
        assert_eq!(request.cooldown_secs, 60);
        assert!(request.force);
    }

    #[test]
    fn test_message_required_without_retry() {
        let result = TestCli::try_parse_from([
            "test", "--webhook", "https://example.com/hook", "--host", "hostA",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_retry_only_invocation() {
        let cli = TestCli::try_parse_from(["test", "--webhook", "https://example.com/hook", "--retry"])
            .unwrap();
        assert!(cli.send.retry);
        assert!(cli.send.request(&Settings::default()).is_none());
    }

    #[test]
    fn test_invalid_webhook_still_queues_alert() {
        let temp = tempfile::tempdir().unwrap();
        let settings = Settings::with_root(temp.path());
        let cli = TestCli::try_parse_from([
            "test", "--webhook", "not-a-url", "--message", "disk full", "--host", "hostA",
        ])
        .unwrap();

        assert!(handle_send(cli.send, &settings).is_err());

        let queue = AlertQueue::new(&settings.queue_dir);
        let item = queue.list_pending().unwrap().next().unwrap();
        let entry = item.entry.unwrap();
        assert_eq!(entry.alert.message, "disk full");
        assert_eq!(entry.failure_reason, "exception");
    }

    #[test]
    fn test_default_severity_and_cooldown() {
        let cli = TestCli::try_parse_from([
            "test", "--webhook", "https://example.com/hook", "--message", "m", "--host", "h",
        ])
        .unwrap();
        let request = cli.send.request(&Settings::default()).unwrap();

        assert_eq!(request.alert.severity, Severity::Warning);
        assert_eq!(request.cooldown_secs, 300);
    }
}
