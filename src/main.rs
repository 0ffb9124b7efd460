//! CCDC Alert CLI
//!
//! 入侵检测告警发送：冷却去重、失败入队、后台重试

use std::process::ExitCode;

use anyhow::Result;
use ccdc_alert::cli::{handle_daemon, handle_send, handle_stats, DaemonArgs, SendArgs, StatsArgs};
use ccdc_alert::config::Settings;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "ccdc-alert")]
#[command(about = "CCDC Alert - 入侵检测告警发送与重试")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送一条告警（失败时入队）
    Send(SendArgs),
    /// 运行重试 daemon（前台，SIGINT / SIGTERM 退出）
    Daemon(DaemonArgs),
    /// 查看重试队列状态
    Stats(StatsArgs),
}

fn main() -> Result<ExitCode> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug ccdc-alert daemon
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ccdc_alert=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.command {
        Commands::Send(args) => {
            let code = handle_send(args, &settings)?;
            return Ok(ExitCode::from(code));
        }
        Commands::Daemon(args) => {
            handle_daemon(args, &settings)?;
        }
        Commands::Stats(args) => {
            handle_stats(args, &settings)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
