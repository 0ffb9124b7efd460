// src/cli/stats.rs
//! Stats 命令 - 查看重试队列状态

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::output::{format_json, format_stats};
use crate::config::Settings;
use crate::queue::{AlertQueue, EntryId, QueueStats};

/// Stats 命令参数
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,

    /// 同时列出已归档（超过重试上限）和已隔离（损坏）的条目
    #[arg(long)]
    pub archived: bool,
}

/// `--json` 输出；带 `--archived` 时附加条目 id
#[derive(Debug, Serialize)]
struct StatsReport<'a> {
    #[serde(flatten)]
    stats: &'a QueueStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    archived_ids: Option<Vec<EntryId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    corrupt_ids: Option<Vec<EntryId>>,
}

/// 处理 stats 命令
pub fn handle_stats(args: StatsArgs, settings: &Settings) -> Result<()> {
    let queue = AlertQueue::new(&settings.queue_dir);
    println!("{}", render_stats(&queue, &args)?);
    Ok(())
}

fn render_stats(queue: &AlertQueue, args: &StatsArgs) -> Result<String> {
    let stats = queue.stats()?;
    let (archived_ids, corrupt_ids) = if args.archived {
        (Some(queue.list_archived()?), Some(queue.list_corrupt()?))
    } else {
        (None, None)
    };

    if args.json {
        return Ok(format_json(&StatsReport {
            stats: &stats,
            archived_ids,
            corrupt_ids,
        }));
    }

    let mut out = format_stats(&stats);
    for id in archived_ids.iter().flatten() {
        out.push_str(&format!("\n{} (archived)", id));
    }
    for id in corrupt_ids.iter().flatten() {
        out.push_str(&format!("\n{} (corrupt)", id));
    }
    Ok(out)
}
