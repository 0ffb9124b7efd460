//! 发送流程 - 冷却判断 → 发送 → 失败入队
//!
//! 每次调用都是独立进程中的一次性操作，多个进程可以并发调用；
//! 同一 `(severity, fingerprint)` 的冷却判断由冷却存储的按键锁串行化。

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::alert::Alert;
use crate::config::Settings;
use crate::cooldown::{CooldownDecision, CooldownStore};
use crate::error::QueueResult;
use crate::fingerprint::AlertFingerprint;
use crate::queue::{AlertQueue, DrainReport, EntryId};
use crate::transport::{Outcome, Transport};

/// 一次发送请求
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub alert: Alert,
    /// 冷却时间（秒）
    pub cooldown_secs: u64,
    /// 跳过冷却判断
    pub force: bool,
}

impl SendRequest {
    pub fn new(alert: Alert, cooldown_secs: u64) -> Self {
        Self {
            alert,
            cooldown_secs,
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// 已送达
    Delivered,
    /// 冷却中，未发送
    Suppressed { remaining_secs: u64 },
    /// 发送失败，已入队等待重试
    Queued { entry_id: EntryId, outcome: Outcome },
}

impl SendOutcome {
    /// 进程退出码：送达和被抑制都不是错误，入队为 1
    pub fn exit_code(&self) -> u8 {
        match self {
            SendOutcome::Delivered | SendOutcome::Suppressed { .. } => 0,
            SendOutcome::Queued { .. } => 1,
        }
    }
}

/// 告警发送器
pub struct AlertSender {
    cooldown: CooldownStore,
    queue: AlertQueue,
    transport: Arc<dyn Transport>,
}

impl AlertSender {
    /// 按配置创建（探测锁模式）
    pub fn new(settings: &Settings, transport: Arc<dyn Transport>) -> Self {
        Self::from_parts(
            CooldownStore::new(&settings.cache_dir),
            AlertQueue::new(&settings.queue_dir),
            transport,
        )
    }

    pub fn from_parts(
        cooldown: CooldownStore,
        queue: AlertQueue,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            cooldown,
            queue,
            transport,
        }
    }

    pub fn queue(&self) -> &AlertQueue {
        &self.queue
    }

    pub fn cooldown(&self) -> &CooldownStore {
        &self.cooldown
    }

    /// 发送一条告警
    ///
    /// 只有入队本身失败才返回错误（告警会丢失）。
    pub fn send(&self, request: &SendRequest) -> Result<SendOutcome> {
        let alert = &request.alert;
        let fingerprint = AlertFingerprint::of(&alert.host, &alert.message);

        if !request.force {
            match self
                .cooldown
                .decide(alert.severity, &fingerprint, request.cooldown_secs)
            {
                CooldownDecision::Suppressed { remaining_secs } => {
                    return Ok(SendOutcome::Suppressed { remaining_secs });
                }
                CooldownDecision::FailedOpen { reason } => {
                    warn!(
                        fingerprint = %fingerprint,
                        reason = %reason,
                        "Cooldown store failed open"
                    );
                }
                CooldownDecision::Allowed => {}
            }
        }

        let outcome = self.transport.send(alert);
        if outcome.is_delivered() {
            if request.force {
                if let Err(e) = self.cooldown.record_sent(alert.severity, &fingerprint) {
                    warn!(fingerprint = %fingerprint, error = %e, "Failed to record forced alert");
                }
            }
            return Ok(SendOutcome::Delivered);
        }

        let entry_id = self
            .queue
            .enqueue(alert, &outcome.failure_reason())
            .context("failed to queue undelivered alert")?;

        info!(
            entry_id = %entry_id,
            outcome = %outcome,
            "Alert delivery failed, queued for retry"
        );
        Ok(SendOutcome::Queued { entry_id, outcome })
    }

    /// 手动触发一次重试（与 daemon 并发时只是尽力而为）
    pub fn retry_queued(&self) -> QueueResult<DrainReport> {
        let report = self.queue.drain(self.transport.as_ref())?;
        info!(
            delivered = report.delivered,
            failed = report.failed,
            archived = report.archived,
            "Manual retry finished"
        );
        Ok(report)
    }
}
