//! Queue statistics and drain results.

use std::time::Duration;

use serde::Serialize;

use super::entry::EntryId;

/// Read-only snapshot of the queue
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Entries waiting for delivery
    pub pending: usize,
    /// Entries that exhausted their retries
    pub archived: usize,
    /// Unreadable entries moved aside by drain
    pub corrupt: usize,
    /// Age of the oldest pending entry in seconds
    pub oldest_age_secs: Option<u64>,
    /// Id of the oldest pending entry
    pub oldest_id: Option<EntryId>,
}

impl QueueStats {
    pub fn oldest_age(&self) -> Option<Duration> {
        self.oldest_age_secs.map(Duration::from_secs)
    }

    pub fn is_idle(&self) -> bool {
        self.pending == 0
    }
}

/// Result of one drain pass.
///
/// `archived` and `corrupt` are already counted in `failed`. Corrupt entries are
/// quarantined, so they are counted by exactly one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub archived: usize,
    pub corrupt: usize,
}

impl DrainReport {
    pub fn success_count(&self) -> usize {
        self.delivered
    }

    pub fn failure_count(&self) -> usize {
        self.failed
    }

    /// Nothing was attempted
    pub fn is_empty(&self) -> bool {
        self.delivered == 0 && self.failed == 0
    }
}
