//! Output formatting for CLI commands

use serde::Serialize;

use crate::queue::QueueStats;

/// Format output as pretty JSON
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

/// Human readable queue stats
pub fn format_stats(stats: &QueueStats) -> String {
    let mut out = format!("待发送: {}\n已归档: {}", stats.pending, stats.archived);
    if stats.corrupt > 0 {
        out.push_str(&format!("\n已隔离(损坏): {}", stats.corrupt));
    }
    if let (Some(id), Some(age)) = (&stats.oldest_id, stats.oldest_age_secs) {
        out.push_str(&format!("\n最早条目: {} ({}s 前)", id, age));
    }
    out
}
