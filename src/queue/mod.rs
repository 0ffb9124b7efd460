//! 重试队列 - 发送失败的告警落盘，等待 daemon 重试
//!
//! 目录布局：
//!
//! ```text
//! <queue_dir>/<id>.json         - 待发送
//! <queue_dir>/<id>.json.failed  - 超过重试上限，已归档（保留审计）
//! <queue_dir>/<id>.json.corrupt - 无法解析，已隔离（保留给人工排查）
//! <queue_dir>/<id>.json.tmp     - 写入中的临时文件（忽略）
//! ```
//!
//! 所有状态变化都靠文件系统原子操作：创建（临时文件 + rename）、删除、归档和隔离（rename）。
//! 同一时间只应有一个 drain（daemon 是唯一的 drainer，手动 `--retry` 只是尽力而为）。

pub mod entry;
pub mod stats;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::alert::Alert;
use crate::error::{QueueError, QueueResult};
use crate::transport::Transport;

pub use entry::{EntryId, QueueEntry};
pub use stats::{DrainReport, QueueStats};

/// 重试上限：retry_count 达到此值的条目在下一次 drain 时归档
pub const MAX_RETRIES: u32 = 10;

const PENDING_SUFFIX: &str = ".json";
const ARCHIVED_SUFFIX: &str = ".json.failed";
const CORRUPT_SUFFIX: &str = ".json.corrupt";
const TEMP_SUFFIX: &str = ".json.tmp";

/// 一次 `list_pending` 快照中的一项
#[derive(Debug)]
pub struct PendingItem {
    pub id: EntryId,
    /// 解析失败时为 `QueueError::Corrupt`
    pub entry: QueueResult<QueueEntry>,
}

/// 待发送条目的单次快照，按 id 排序，逐个读取
pub struct PendingEntries {
    dir: PathBuf,
    ids: std::vec::IntoIter<EntryId>,
}

impl PendingEntries {
    /// 剩余条目数
    pub fn remaining(&self) -> usize {
        self.ids.len()
    }
}

impl Iterator for PendingEntries {
    type Item = PendingItem;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids.next()?;
        let entry = read_entry(&self.dir, &id);
        Some(PendingItem { id, entry })
    }
}

/// 磁盘重试队列
#[derive(Debug, Clone)]
pub struct AlertQueue {
    dir: PathBuf,
}

impl AlertQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pending_path(&self, id: &EntryId) -> PathBuf {
        pending_path(&self.dir, id)
    }

    fn archived_path(&self, id: &EntryId) -> PathBuf {
        self.dir.join(format!("{}{}", id, ARCHIVED_SUFFIX))
    }

    fn corrupt_path(&self, id: &EntryId) -> PathBuf {
        self.dir.join(format!("{}{}", id, CORRUPT_SUFFIX))
    }

    fn temp_path(&self, id: &EntryId) -> PathBuf {
        self.dir.join(format!("{}{}", id, TEMP_SUFFIX))
    }

    /// 入队，retry_count = 0
    pub fn enqueue(&self, alert: &Alert, failure_reason: &str) -> QueueResult<EntryId> {
        self.enqueue_at(alert, failure_reason, Utc::now())
    }

    pub fn enqueue_at(
        &self,
        alert: &Alert,
        failure_reason: &str,
        now: DateTime<Utc>,
    ) -> QueueResult<EntryId> {
        fs::create_dir_all(&self.dir)?;

        let entry = QueueEntry::new(alert.clone(), failure_reason, now);
        self.write_entry(&entry, true)?;

        info!(
            entry_id = %entry.id,
            severity = %alert.severity,
            host = %alert.host,
            reason = %failure_reason,
            "Alert queued for retry"
        );
        Ok(entry.id)
    }

    /// 临时文件 + fsync + rename + 目录 fsync
    fn write_entry(&self, entry: &QueueEntry, create: bool) -> QueueResult<()> {
        let temp_path = self.temp_path(&entry.id);
        let json = entry.to_json()?;
        {
            let mut options = OpenOptions::new();
            options.write(true);
            if create {
                options.create_new(true);
            } else {
                options.create(true).truncate(true);
            }
            let mut file = options.open(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, self.pending_path(&entry.id))?;
        sync_dir(&self.dir);
        Ok(())
    }

    /// 读取单个待发送条目
    pub fn load(&self, id: &EntryId) -> QueueResult<QueueEntry> {
        read_entry(&self.dir, id)
    }

    /// 待发送条目快照（按 id 即提交时间排序，不含归档和临时文件）
    pub fn list_pending(&self) -> QueueResult<PendingEntries> {
        let ids = self.scan(PENDING_SUFFIX)?;
        Ok(PendingEntries {
            dir: self.dir.clone(),
            ids: ids.into_iter(),
        })
    }

    /// 已归档条目 id
    pub fn list_archived(&self) -> QueueResult<Vec<EntryId>> {
        self.scan(ARCHIVED_SUFFIX)
    }

    /// 已隔离（损坏）条目 id
    pub fn list_corrupt(&self) -> QueueResult<Vec<EntryId>> {
        self.scan(CORRUPT_SUFFIX)
    }

    fn scan(&self, suffix: &str) -> QueueResult<Vec<EntryId>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Some(stem) = name.strip_suffix(suffix) else {
                continue;
            };
            match EntryId::parse(stem) {
                Ok(id) => ids.push(id),
                Err(e) => debug!(file = %name, error = %e, "Skipping unexpected file in queue dir"),
            }
        }

        ids.sort();
        Ok(ids)
    }

    /// 逐个重试待发送条目
    ///
    /// - retry_count >= 10：归档，不调用 transport，计为失败
    /// - 发送成功：删除，计为成功
    /// - 发送失败：retry_count + 1，记录失败原因，保留，计为失败
    /// - 条目损坏：记录日志，计为失败，隔离为 `.json.corrupt`，继续处理后续条目
    pub fn drain(&self, transport: &dyn Transport) -> QueueResult<DrainReport> {
        let mut report = DrainReport::default();

        for item in self.list_pending()? {
            let mut entry = match item.entry {
                Ok(entry) => entry,
                Err(QueueError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(entry_id = %item.id, "Entry vanished before drain, skipping");
                    continue;
                }
                Err(e) => {
                    error!(entry_id = %item.id, error = %e, "Failed to read queued alert");
                    report.failed += 1;
                    if e.is_corruption() {
                        report.corrupt += 1;
                        match self.quarantine(&item.id) {
                            Ok(()) => warn!(entry_id = %item.id, "Corrupt alert moved aside"),
                            Err(e) => {
                                error!(entry_id = %item.id, error = %e, "Failed to quarantine corrupt alert")
                            }
                        }
                    }
                    continue;
                }
            };

            if entry.retry_count >= MAX_RETRIES {
                match self.archive(&entry.id) {
                    Ok(()) => {
                        warn!(
                            entry_id = %entry.id,
                            retry_count = entry.retry_count,
                            last_reason = %entry.failure_reason,
                            "Alert exceeded retry limit, archived"
                        );
                        report.archived += 1;
                    }
                    Err(e) => {
                        error!(entry_id = %entry.id, error = %e, "Failed to archive alert");
                    }
                }
                report.failed += 1;
                continue;
            }

            let outcome = transport.send(&entry.alert);
            if outcome.is_delivered() {
                if let Err(e) = self.remove(&entry.id) {
                    error!(
                        entry_id = %entry.id,
                        error = %e,
                        "Alert delivered but queue entry could not be removed"
                    );
                }
                info!(entry_id = %entry.id, "Queued alert delivered");
                report.delivered += 1;
                continue;
            }

            entry.retry_count += 1;
            entry.failure_reason = outcome.failure_reason();
            warn!(
                entry_id = %entry.id,
                retry_count = entry.retry_count,
                reason = %entry.failure_reason,
                "Queued alert delivery failed"
            );
            if let Err(e) = self.write_entry(&entry, false) {
                error!(entry_id = %entry.id, error = %e, "Failed to update queued alert");
            }
            report.failed += 1;
        }

        Ok(report)
    }

    /// 归档：rename 为 `.json.failed`
    pub fn archive(&self, id: &EntryId) -> QueueResult<()> {
        fs::rename(self.pending_path(id), self.archived_path(id))?;
        sync_dir(&self.dir);
        Ok(())
    }

    /// 隔离：rename 为 `.json.corrupt`，不再参与 drain
    pub fn quarantine(&self, id: &EntryId) -> QueueResult<()> {
        fs::rename(self.pending_path(id), self.corrupt_path(id))?;
        sync_dir(&self.dir);
        Ok(())
    }

    /// 删除已送达的条目
    pub fn remove(&self, id: &EntryId) -> QueueResult<()> {
        match fs::remove_file(self.pending_path(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        sync_dir(&self.dir);
        Ok(())
    }

    /// 只读统计
    pub fn stats(&self) -> QueueResult<QueueStats> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> QueueResult<QueueStats> {
        let pending = self.scan(PENDING_SUFFIX)?;
        let archived = self.scan(ARCHIVED_SUFFIX)?.len();
        let corrupt = self.scan(CORRUPT_SUFFIX)?.len();

        let oldest_id = pending.first().cloned();
        let oldest_age_secs = oldest_id
            .as_ref()
            .and_then(|id| id.submitted_at())
            .map(|submitted| (now - submitted).num_seconds().max(0) as u64);

        Ok(QueueStats {
            pending: pending.len(),
            archived,
            corrupt,
            oldest_age_secs,
            oldest_id,
        })
    }
}

fn pending_path(dir: &Path, id: &EntryId) -> PathBuf {
    dir.join(format!("{}{}", id, PENDING_SUFFIX))
}

fn read_entry(dir: &Path, id: &EntryId) -> QueueResult<QueueEntry> {
    let content = fs::read_to_string(pending_path(dir, id))?;
    QueueEntry::from_json(id.clone(), &content)
}

/// rename 之后 fsync 目录，失败只记日志（部分平台不支持打开目录）
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "Directory fsync skipped");
    }
}
