//! 运行配置 - 进程启动时构造一次，显式传给各组件
//!
//! 默认使用系统路径：
//! - 冷却记录：`/var/cache/ccdc_alerts`
//! - 重试队列：`/var/spool/ccdc_alerts`
//! - Webhook URL：`/etc/ccdc/webhook_url`
//!
//! 环境变量 `CCDC_ALERT_STATE_DIR` 可以把所有状态放到同一个根目录下，
//! `CCDC_ALERT_WEBHOOK_FILE` 单独覆盖 webhook URL 文件位置。

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ConfigError;

/// 默认冷却时间（秒）
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

const SYSTEM_CACHE_DIR: &str = "/var/cache/ccdc_alerts";
const SYSTEM_QUEUE_DIR: &str = "/var/spool/ccdc_alerts";
const SYSTEM_WEBHOOK_FILE: &str = "/etc/ccdc/webhook_url";

const STATE_DIR_ENV: &str = "CCDC_ALERT_STATE_DIR";
const WEBHOOK_FILE_ENV: &str = "CCDC_ALERT_WEBHOOK_FILE";

/// 重试 daemon 参数
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonSettings {
    /// 轮询间隔
    pub interval: Duration,
    /// 连续失败多少轮后升级为 critical（默认 12 轮 ≈ 1 小时）
    pub escalation_threshold: u32,
    /// 待发送数量超过此值时告警
    pub backlog_warn: usize,
    /// 已归档数量超过此值时告警
    pub archived_warn: usize,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            escalation_threshold: 12,
            backlog_warn: 10,
            archived_warn: 5,
        }
    }
}

/// 全部运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// 冷却记录目录
    pub cache_dir: PathBuf,
    /// 重试队列目录
    pub queue_dir: PathBuf,
    /// Webhook URL 文件（daemon 启动时读取一次）
    pub webhook_url_file: PathBuf,
    /// 默认冷却时间（秒）
    pub default_cooldown_secs: u64,
    /// daemon 参数
    pub daemon: DaemonSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(SYSTEM_CACHE_DIR),
            queue_dir: PathBuf::from(SYSTEM_QUEUE_DIR),
            webhook_url_file: PathBuf::from(SYSTEM_WEBHOOK_FILE),
            default_cooldown_secs: DEFAULT_COOLDOWN_SECS,
            daemon: DaemonSettings::default(),
        }
    }
}

impl Settings {
    /// 所有状态放在同一个根目录下（测试和非 root 用户使用）
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            cache_dir: root.join("cache"),
            queue_dir: root.join("queue"),
            webhook_url_file: root.join("webhook_url"),
            ..Self::default()
        }
    }

    /// 从环境变量构造配置
    ///
    /// 系统目录不可写时（非 root 运行）回退到用户缓存目录。
    pub fn from_env() -> Self {
        let mut settings = match std::env::var_os(STATE_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::with_root(PathBuf::from(dir)),
            _ => Self::system_or_user(),
        };

        if let Some(file) = std::env::var_os(WEBHOOK_FILE_ENV).filter(|f| !f.is_empty()) {
            settings.webhook_url_file = PathBuf::from(file);
        }

        debug!(
            cache_dir = %settings.cache_dir.display(),
            queue_dir = %settings.queue_dir.display(),
            "Settings loaded"
        );
        settings
    }

    fn system_or_user() -> Self {
        let system = Self::default();
        if fs::create_dir_all(&system.cache_dir).is_ok() && fs::create_dir_all(&system.queue_dir).is_ok() {
            return system;
        }

        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ccdc-alert");
        warn!(
            fallback = %root.display(),
            "System state directories not writable, using per-user cache"
        );
        Self {
            webhook_url_file: system.webhook_url_file,
            ..Self::with_root(root)
        }
    }

    /// 设置 daemon 轮询间隔
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.daemon.interval = interval;
        self
    }
}

/// 读取 webhook URL 文件
///
/// 文件不存在、为空或不是 http(s) URL 都是配置错误。
pub fn read_webhook_url(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingEndpoint {
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let url = content.trim();
    if url.is_empty() {
        return Err(ConfigError::EmptyEndpoint {
            path: path.to_path_buf(),
        });
    }
    validate_webhook_url(url)?;

    Ok(url.to_string())
}

/// 检查 webhook URL 的基本格式
pub fn validate_webhook_url(url: &str) -> Result<(), ConfigError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidEndpoint {
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_paths() {
        let settings = Settings::default();
        assert_eq!(settings.cache_dir, PathBuf::from("/var/cache/ccdc_alerts"));
        assert_eq!(settings.webhook_url_file, PathBuf::from("/etc/ccdc/webhook_url"));
        assert_eq!(settings.default_cooldown_secs, 300);
    }

    #[test]
    fn test_daemon_defaults() {
        let daemon = DaemonSettings::default();
        assert_eq!(daemon.interval, Duration::from_secs(300));
        assert_eq!(daemon.escalation_threshold, 12);
        assert_eq!(daemon.backlog_warn, 10);
        assert_eq!(daemon.archived_warn, 5);
    }

    #[test]
    fn test_with_root() {
        let settings = Settings::with_root("/tmp/ccdc");
        assert_eq!(settings.cache_dir, PathBuf::from("/tmp/ccdc/cache"));
        assert_eq!(settings.queue_dir, PathBuf::from("/tmp/ccdc/queue"));
        assert_eq!(settings.webhook_url_file, PathBuf::from("/tmp/ccdc/webhook_url"));
    }

    #[test]
    fn test_read_webhook_url_missing() {
        let temp = tempdir().unwrap();
        let err = read_webhook_url(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint { .. }));
    }

    #[test]
    fn test_read_webhook_url_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("webhook_url");
        fs::write(&path, "  \n").unwrap();

        let err = read_webhook_url(&path).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyEndpoint { .. }));
    }

    #[test]
    fn test_read_webhook_url_trims() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("webhook_url");
        fs::write(&path, "https://discord.example/api/webhooks/1/abc\n").unwrap();

        let url = read_webhook_url(&path).unwrap();
        assert_eq!(url, "https://discord.example/api/webhooks/1/abc");
    }

    #[test]
    fn test_read_webhook_url_rejects_non_http() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("webhook_url");
        fs::write(&path, "ftp://example").unwrap();

        let err = read_webhook_url(&path).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }
}
