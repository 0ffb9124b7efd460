//! CCDC Alert - 入侵检测告警发送
//!
//! 告警先经过冷却判断（同一 host + message 在冷却期内只发一次），再通过 webhook 发送；
//! 发送失败的告警写入持久化队列，由重试 daemon 定期重发。

pub mod alert;
pub mod cli;
pub mod config;
pub mod cooldown;
pub mod daemon;
pub mod error;
pub mod fingerprint;
pub mod queue;
pub mod sender;
pub mod transport;

pub use alert::{Alert, Severity};
pub use config::{DaemonSettings, Settings};
pub use cooldown::{CooldownDecision, CooldownStore, LockMode};
pub use daemon::{CycleOutcome, FailureStreak, RetryDaemon, StreakEvent};
pub use error::{ConfigError, LockError, QueueError, QueueResult};
pub use fingerprint::AlertFingerprint;
pub use queue::{AlertQueue, DrainReport, EntryId, QueueEntry, QueueStats};
pub use sender::{AlertSender, SendOutcome, SendRequest};
pub use transport::{Outcome, Transport, WebhookConfig, WebhookTransport};
