//! Retry Daemon 模块 - 定期重试队列中的告警
//!
//! 每轮：读取统计 → 有待发送条目则 drain → 更新连续失败计数 → 积压/归档告警 → 等待下一轮。
//!
//! 任何一轮内部的错误（包括 panic）都只记为一次失败轮次，循环本身只在收到
//! 关闭信号（SIGINT / SIGTERM）后于两轮之间退出。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::DaemonSettings;
use crate::queue::{AlertQueue, DrainReport, QueueStats};
use crate::transport::Transport;

/// Daemon 所处状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonPhase {
    /// 队列为空
    Idle,
    /// 队列中有待发送条目
    Draining,
}

/// 一轮的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// 没有待发送条目
    Idle(QueueStats),
    /// 执行了 drain
    Drained {
        stats: QueueStats,
        report: DrainReport,
    },
    /// 本轮出错（读取统计失败、drain 失败、panic）
    Errored(String),
}

impl CycleOutcome {
    fn stats(&self) -> Option<&QueueStats> {
        match self {
            CycleOutcome::Idle(stats) | CycleOutcome::Drained { stats, .. } => Some(stats),
            CycleOutcome::Errored(_) => None,
        }
    }
}

/// 连续失败计数的变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakEvent {
    /// 无变化
    Unchanged,
    /// 有成功发送，计数清零
    Reset,
    /// 队列已清空，计数清零
    Cleared,
    /// 计数 +1
    Incremented(u32),
    /// 计数 +1 且达到升级阈值
    Escalated(u32),
}

/// 连续失败轮次计数
#[derive(Debug, Clone)]
pub struct FailureStreak {
    count: u32,
    threshold: u32,
}

impl FailureStreak {
    pub fn new(threshold: u32) -> Self {
        Self { count: 0, threshold }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// 根据一轮结果更新计数
    ///
    /// 同一轮既有成功又有失败时，先清零再 +1，结束时为 1。
    pub fn observe(&mut self, outcome: &CycleOutcome) -> StreakEvent {
        match outcome {
            CycleOutcome::Idle(_) => {
                if self.count > 0 {
                    self.count = 0;
                    StreakEvent::Cleared
                } else {
                    StreakEvent::Unchanged
                }
            }
            CycleOutcome::Drained { report, .. } => {
                let mut event = StreakEvent::Unchanged;
                if report.success_count() > 0 {
                    self.count = 0;
                    event = StreakEvent::Reset;
                }
                if report.failure_count() > 0 {
                    event = self.bump();
                }
                event
            }
            CycleOutcome::Errored(_) => self.bump(),
        }
    }

    fn bump(&mut self) -> StreakEvent {
        self.count = self.count.saturating_add(1);
        if self.count >= self.threshold {
            StreakEvent::Escalated(self.count)
        } else {
            StreakEvent::Incremented(self.count)
        }
    }
}

/// 重试 daemon
pub struct RetryDaemon {
    queue: AlertQueue,
    transport: Arc<dyn Transport>,
    settings: DaemonSettings,
    streak: FailureStreak,
    phase: DaemonPhase,
}

impl RetryDaemon {
    pub fn new(queue: AlertQueue, transport: Arc<dyn Transport>, settings: DaemonSettings) -> Self {
        let streak = FailureStreak::new(settings.escalation_threshold);
        Self {
            queue,
            transport,
            settings,
            streak,
            phase: DaemonPhase::Idle,
        }
    }

    pub fn consecutive_failure_cycles(&self) -> u32 {
        self.streak.count()
    }

    pub fn phase(&self) -> DaemonPhase {
        self.phase
    }

    /// 同步执行一轮
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let outcome = execute_cycle(&self.queue, self.transport.as_ref());
        self.after_cycle(&outcome);
        outcome
    }

    /// 主循环，直到 `shutdown` 变为 true（或发送端关闭）
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            queue_dir = %self.queue.dir().display(),
            "Alert retry daemon started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let queue = self.queue.clone();
            let transport = Arc::clone(&self.transport);
            let outcome =
                match tokio::task::spawn_blocking(move || execute_cycle(&queue, transport.as_ref()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => CycleOutcome::Errored(format!("retry cycle aborted: {}", e)),
                };
            self.after_cycle(&outcome);

            tokio::select! {
                _ = tokio::time::sleep(self.settings.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Received shutdown signal, alert retry daemon stopped");
    }

    fn after_cycle(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Idle(_) => self.phase = DaemonPhase::Idle,
            CycleOutcome::Drained { report, .. } => {
                self.phase = DaemonPhase::Draining;
                if report.delivered > 0 {
                    info!(delivered = report.delivered, "Successfully delivered queued alerts");
                }
            }
            CycleOutcome::Errored(reason) => {
                error!(error = %reason, "Unexpected error in retry cycle");
            }
        }

        match self.streak.observe(outcome) {
            StreakEvent::Cleared => info!("Queue cleared, resetting failure counter"),
            StreakEvent::Incremented(count) => {
                if let CycleOutcome::Drained { report, .. } = outcome {
                    warn!(
                        failed = report.failed,
                        consecutive = count,
                        "Failed to deliver queued alerts"
                    );
                }
            }
            StreakEvent::Escalated(count) => {
                error!(
                    consecutive = count,
                    threshold = self.settings.escalation_threshold,
                    escalation = true,
                    "CRITICAL: exceeded max consecutive failure cycles, check webhook URL (retries continue)"
                );
            }
            StreakEvent::Reset | StreakEvent::Unchanged => {}
        }

        if let Some(stats) = outcome.stats() {
            if stats.pending > self.settings.backlog_warn {
                warn!(
                    pending = stats.pending,
                    oldest_age_secs = ?stats.oldest_age_secs,
                    "Alert queue backlog"
                );
            }
            if stats.archived > self.settings.archived_warn {
                warn!(
                    archived = stats.archived,
                    "Persistent failures: alerts exceeded retry limit"
                );
            }
        }
    }
}

/// 一轮的实际工作；panic 也转换为 `Errored`
fn execute_cycle(queue: &AlertQueue, transport: &dyn Transport) -> CycleOutcome {
    match catch_unwind(AssertUnwindSafe(|| cycle_inner(queue, transport))) {
        Ok(outcome) => outcome,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            CycleOutcome::Errored(format!("panic in retry cycle: {}", detail))
        }
    }
}

fn cycle_inner(queue: &AlertQueue, transport: &dyn Transport) -> CycleOutcome {
    let stats = match queue.stats() {
        Ok(stats) => stats,
        Err(e) => return CycleOutcome::Errored(format!("failed to read queue stats: {}", e)),
    };

    if stats.pending == 0 {
        return CycleOutcome::Idle(stats);
    }

    info!(pending = stats.pending, "Processing queued alerts");
    match queue.drain(transport) {
        Ok(report) => CycleOutcome::Drained { stats, report },
        Err(e) => CycleOutcome::Errored(format!("drain failed: {}", e)),
    }
}

/// 等待 SIGINT 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// 启动信号监听任务，返回关闭通知
///
/// 必须在 runtime 内调用。
pub fn spawn_shutdown_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = tx.send(true);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained(delivered: usize, failed: usize) -> CycleOutcome {
        CycleOutcome::Drained {
            stats: QueueStats {
                pending: delivered + failed,
                ..Default::default()
            },
            report: DrainReport {
                delivered,
                failed,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_failures_accumulate() {
        let mut streak = FailureStreak::new(12);
        assert_eq!(streak.observe(&drained(0, 2)), StreakEvent::Incremented(1));
        assert_eq!(streak.observe(&drained(0, 1)), StreakEvent::Incremented(2));
        assert_eq!(streak.count(), 2);
    }

    #[test]
    fn test_success_resets() {
        let mut streak = FailureStreak::new(12);
        streak.observe(&drained(0, 1));
        streak.observe(&drained(0, 1));
        assert_eq!(streak.observe(&drained(3, 0)), StreakEvent::Reset);
        assert_eq!(streak.count(), 0);
    }

    #[test]
    fn test_mixed_cycle_ends_at_one() {
        let mut streak = FailureStreak::new(12);
        for _ in 0..5 {
            streak.observe(&drained(0, 1));
        }
        assert_eq!(streak.observe(&drained(1, 1)), StreakEvent::Incremented(1));
        assert_eq!(streak.count(), 1);
    }

    #[test]
    fn test_idle_clears_only_when_nonzero() {
        let mut streak = FailureStreak::new(12);
        let idle = CycleOutcome::Idle(QueueStats::default());
        assert_eq!(streak.observe(&idle), StreakEvent::Unchanged);

        streak.observe(&drained(0, 1));
        assert_eq!(streak.observe(&idle), StreakEvent::Cleared);
        assert_eq!(streak.count(), 0);
    }

    #[test]
    fn test_escalates_at_threshold_and_keeps_counting() {
        let mut streak = FailureStreak::new(12);
        for i in 1..12 {
            assert_eq!(streak.observe(&drained(0, 1)), StreakEvent::Incremented(i));
        }
        assert_eq!(streak.observe(&drained(0, 1)), StreakEvent::Escalated(12));
        assert_eq!(streak.observe(&drained(0, 1)), StreakEvent::Escalated(13));
    }

    #[test]
    fn test_errored_cycle_counts_as_failure() {
        let mut streak = FailureStreak::new(12);
        let errored = CycleOutcome::Errored("boom".into());
        assert_eq!(streak.observe(&errored), StreakEvent::Incremented(1));
    }
}
