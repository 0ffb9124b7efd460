//! Error types for alert delivery.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading startup configuration.
///
/// These are the only fatal conditions for the retry daemon.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Webhook URL file does not exist
    #[error("webhook URL file not found: {}", path.display())]
    MissingEndpoint { path: PathBuf },

    /// Webhook URL file exists but is blank
    #[error("webhook URL file is empty: {}", path.display())]
    EmptyEndpoint { path: PathBuf },

    /// Webhook URL is not an http(s) URL
    #[error("webhook URL must start with http:// or https://: {url}")]
    InvalidEndpoint { url: String },

    /// Webhook URL file could not be read
    #[error("failed to read webhook URL file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors raised while taking a per-key cooldown lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Filesystem does not support locking (e.g. discovered on NFS at runtime)
    #[error("file lock unavailable: {0}")]
    Unavailable(#[source] io::Error),

    /// Opening or locking the lock file failed
    #[error("failed to lock cooldown record: {0}")]
    Io(#[source] io::Error),
}

/// Errors raised by the durable queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// IO error on the spool directory or an entry file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Entry file exists but does not match the record schema
    #[error("corrupt queue entry {id}: {source}")]
    Corrupt {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Entry could not be serialized
    #[error("failed to serialize queue entry: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Entry id contains unsafe characters
    #[error("invalid queue entry id: {0}")]
    InvalidId(String),
}

impl QueueError {
    /// Whether this error is a per-entry corruption (counted, never fatal)
    pub fn is_corruption(&self) -> bool {
        matches!(self, QueueError::Corrupt { .. })
    }
}

/// Result type for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;
