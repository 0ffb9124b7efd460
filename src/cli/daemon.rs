// src/cli/daemon.rs
//! Daemon 命令 - 前台运行重试 daemon，直到收到 SIGINT / SIGTERM

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tracing::error;

use crate::config::{read_webhook_url, Settings};
use crate::daemon::{spawn_shutdown_listener, RetryDaemon};
use crate::queue::AlertQueue;
use crate::transport::{WebhookConfig, WebhookTransport};

/// Daemon 命令参数
#[derive(Args, Debug)]
pub struct DaemonArgs {
    /// Webhook URL 文件（默认 /etc/ccdc/webhook_url）
    #[arg(long)]
    pub webhook_file: Option<PathBuf>,

    /// 轮询间隔（秒）
    #[arg(long, short)]
    pub interval: Option<u64>,
}

impl DaemonArgs {
    fn apply(&self, settings: &Settings) -> Settings {
        let mut settings = settings.clone();
        if let Some(file) = &self.webhook_file {
            settings.webhook_url_file = file.clone();
        }
        if let Some(secs) = self.interval {
            settings = settings.with_interval(Duration::from_secs(secs.max(1)));
        }
        settings
    }
}

/// 处理 daemon 命令
///
/// HTTP 客户端在 runtime 之外创建和销毁，每轮通过 `spawn_blocking` 执行。
pub fn handle_daemon(args: DaemonArgs, settings: &Settings) -> Result<()> {
    let settings = args.apply(settings);

    let url = match read_webhook_url(&settings.webhook_url_file) {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "Cannot start without webhook URL");
            return Err(e.into());
        }
    };

    let transport = Arc::new(WebhookTransport::new(WebhookConfig::new(url))?);
    let mut daemon = RetryDaemon::new(
        AlertQueue::new(&settings.queue_dir),
        transport,
        settings.daemon.clone(),
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async {
        let shutdown = spawn_shutdown_listener();
        daemon.run(shutdown).await;
    });
    drop(runtime);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_args_override_settings() {
        let args = DaemonArgs {
            webhook_file: Some(PathBuf::from("/tmp/hook")),
            interval: Some(5),
        };
        let settings = args.apply(&Settings::default());

        assert_eq!(settings.webhook_url_file, PathBuf::from("/tmp/hook"));
        assert_eq!(settings.daemon.interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let args = DaemonArgs {
            webhook_file: None,
            interval: Some(0),
        };
        let settings = args.apply(&Settings::default());
        assert_eq!(settings.daemon.interval, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_webhook_file_fails_to_start() {
        let temp = tempdir().unwrap();
        let settings = Settings::with_root(temp.path());
        let args = DaemonArgs {
            webhook_file: None,
            interval: None,
        };

        let err = handle_daemon(args, &settings).unwrap_err();
        assert!(err.to_string().contains("webhook"));
    }
}
