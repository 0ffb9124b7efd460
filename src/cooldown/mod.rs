//! 冷却存储 - 防止同一告警在冷却时间内重复发送
//!
//! 每个 `(severity, fingerprint)` 一个记录文件：
//! `<cache_dir>/last_alert_<severity>_<fingerprint>.json`，内容为
//! `{"timestamp": <unix 秒>, "datetime": "<ISO8601>"}`。
//!
//! ## 判断规则
//! 1. 先拿该键的独占锁（不同键互不阻塞）
//! 2. 没有记录，或 `now - last_sent > cooldown`（严格大于）→ 放行并写入 now
//! 3. 否则拒绝，记录保持不变
//! 4. 存储不可访问时放行

pub mod lock;

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::alert::Severity;
use crate::fingerprint::AlertFingerprint;

pub use lock::{lock_for, FileLock, KeyLock, LockError, LockGuard, LockMode, NoopLock};

/// 冷却记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownRecord {
    /// 上次放行时间（unix 秒，带小数）
    pub timestamp: f64,
    /// 人类可读时间
    pub datetime: String,
}

impl CooldownRecord {
    fn at(now: DateTime<Utc>) -> Self {
        Self {
            timestamp: unix_secs(now),
            datetime: now.to_rfc3339(),
        }
    }
}

/// 冷却判断结果
#[derive(Debug, Clone, PartialEq)]
pub enum CooldownDecision {
    /// 放行，记录已更新
    Allowed,
    /// 冷却中
    Suppressed { remaining_secs: u64 },
    /// 存储不可访问，按放行处理
    FailedOpen { reason: String },
}

impl CooldownDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, CooldownDecision::Suppressed { .. })
    }
}

/// 读取记录的结果
enum RecordRead {
    Missing,
    Found(CooldownRecord),
    Corrupt(serde_json::Error),
}

/// 冷却存储
pub struct CooldownStore {
    dir: PathBuf,
    lock: Box<dyn KeyLock>,
}

impl CooldownStore {
    /// 创建存储，探测文件锁是否可用
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let mode = LockMode::detect(&dir);
        Self::with_mode(dir, mode)
    }

    /// 指定锁模式
    pub fn with_mode(dir: impl Into<PathBuf>, mode: LockMode) -> Self {
        Self::with_lock(dir, lock_for(mode))
    }

    /// 指定锁实现
    pub fn with_lock(dir: impl Into<PathBuf>, lock: Box<dyn KeyLock>) -> Self {
        Self {
            dir: dir.into(),
            lock,
        }
    }

    /// 当前锁模式
    pub fn mode(&self) -> LockMode {
        self.lock.mode()
    }

    /// 记录文件路径
    pub fn record_path(&self, severity: Severity, fingerprint: &AlertFingerprint) -> PathBuf {
        self.dir
            .join(format!("last_alert_{}_{}.json", severity.as_str(), fingerprint))
    }

    fn lock_path(&self, severity: Severity, fingerprint: &AlertFingerprint) -> PathBuf {
        self.dir
            .join(format!("last_alert_{}_{}.lock", severity.as_str(), fingerprint))
    }

    /// 是否应该发送；放行时同时写入当前时间
    pub fn should_send(
        &self,
        severity: Severity,
        fingerprint: &AlertFingerprint,
        cooldown_secs: u64,
    ) -> bool {
        self.decide(severity, fingerprint, cooldown_secs).is_allowed()
    }

    /// 判断并返回详细结果
    pub fn decide(
        &self,
        severity: Severity,
        fingerprint: &AlertFingerprint,
        cooldown_secs: u64,
    ) -> CooldownDecision {
        self.decide_at(severity, fingerprint, cooldown_secs, Utc::now())
    }

    /// 以指定时间作为 now 进行判断
    pub fn decide_at(
        &self,
        severity: Severity,
        fingerprint: &AlertFingerprint,
        cooldown_secs: u64,
        now: DateTime<Utc>,
    ) -> CooldownDecision {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!(
                dir = %self.dir.display(),
                error = %e,
                "Cooldown store unavailable, allowing alert"
            );
            return CooldownDecision::FailedOpen {
                reason: e.to_string(),
            };
        }

        let _guard = match self.lock.acquire(&self.lock_path(severity, fingerprint)) {
            Ok(guard) => guard,
            Err(LockError::Unavailable(e)) => {
                warn!(
                    severity = %severity,
                    fingerprint = %fingerprint,
                    error = %e,
                    mode = "degraded",
                    "File lock unavailable, falling back to unlocked check"
                );
                LockGuard::unlocked()
            }
            Err(LockError::Io(e)) => {
                error!(
                    severity = %severity,
                    fingerprint = %fingerprint,
                    error = %e,
                    "Failed to lock cooldown record, allowing alert"
                );
                return CooldownDecision::FailedOpen {
                    reason: e.to_string(),
                };
            }
        };

        if self.lock.mode() == LockMode::Degraded {
            debug!(
                severity = %severity,
                fingerprint = %fingerprint,
                mode = "degraded",
                "Cooldown check without lock"
            );
        }

        let path = self.record_path(severity, fingerprint);
        match read_record(&path) {
            Ok(RecordRead::Found(record)) => {
                let elapsed = unix_secs(now) - record.timestamp;
                let cooldown = cooldown_secs as f64;
                if elapsed <= cooldown {
                    let remaining_secs = (cooldown - elapsed).max(0.0).ceil() as u64;
                    info!(
                        severity = %severity,
                        fingerprint = %fingerprint,
                        remaining_secs,
                        "Alert suppressed (cooldown active)"
                    );
                    return CooldownDecision::Suppressed { remaining_secs };
                }
            }
            Ok(RecordRead::Missing) => {}
            Ok(RecordRead::Corrupt(e)) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Corrupt cooldown record, treating as absent"
                );
            }
            Err(e) => {
                error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read cooldown record, allowing alert"
                );
                return CooldownDecision::FailedOpen {
                    reason: e.to_string(),
                };
            }
        }

        if let Err(e) = write_record(&path, &CooldownRecord::at(now)) {
            error!(
                path = %path.display(),
                error = %e,
                "Failed to write cooldown record, allowing alert"
            );
            return CooldownDecision::FailedOpen {
                reason: e.to_string(),
            };
        }

        CooldownDecision::Allowed
    }

    /// 无条件写入当前时间（强制发送后开始新的冷却窗口）
    pub fn record_sent(&self, severity: Severity, fingerprint: &AlertFingerprint) -> Result<()> {
        self.record_sent_at(severity, fingerprint, Utc::now())
    }

    pub fn record_sent_at(
        &self,
        severity: Severity,
        fingerprint: &AlertFingerprint,
        now: DateTime<Utc>,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let _guard = match self.lock.acquire(&self.lock_path(severity, fingerprint)) {
            Ok(guard) => guard,
            Err(LockError::Unavailable(_)) => LockGuard::unlocked(),
            Err(LockError::Io(e)) => return Err(e).context("failed to lock cooldown record"),
        };

        write_record(&self.record_path(severity, fingerprint), &CooldownRecord::at(now))
            .context("failed to write cooldown record")
    }

    /// 读取当前记录（只读，不加锁）
    pub fn last_sent(
        &self,
        severity: Severity,
        fingerprint: &AlertFingerprint,
    ) -> Option<CooldownRecord> {
        match read_record(&self.record_path(severity, fingerprint)) {
            Ok(RecordRead::Found(record)) => Some(record),
            _ => None,
        }
    }
}

fn read_record(path: &Path) -> io::Result<RecordRead> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecordRead::Missing),
        Err(e) => return Err(e),
    };

    match serde_json::from_str::<CooldownRecord>(&content) {
        Ok(record) => Ok(RecordRead::Found(record)),
        Err(e) => Ok(RecordRead::Corrupt(e)),
    }
}

/// 临时文件 + rename，读者不会看到写了一半的记录
fn write_record(path: &Path, record: &CooldownRecord) -> io::Result<()> {
    let temp_path = path.with_extension(format!("json.tmp.{}", std::process::id()));
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(serde_json::to_string(record)?.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&temp_path, path)
}

fn unix_secs(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1_000_000.0
}
