//! Trust Relay CLI
//!
//! 读取宿主通知事件并转发到聊天 webhook

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};
use trust_relay::{
    cli::{PendingArgs, RunArgs, SendArgs, StatusArgs},
    RelayConfig,
};

#[derive(Parser)]
#[command(name = "trust")]
#[command(about = "Trust Relay - 把设备通知转发到聊天 webhook")]
#[command(version)]
struct Cli {
    /// 配置文件路径 (默认: ~/.config/trust-relay/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 从 stdin 读取宿主事件并中继（长期运行）
    Run(RunArgs),
    /// 手动发送一条消息
    Send(SendArgs),
    /// 查看、清空或重发待重发消息
    Pending(PendingArgs),
    /// 查看持久化状态
    Status(StatusArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("trust_relay={},trust={}", default_level, default_level))
    });

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let config = RelayConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => trust_relay::cli::handle_run(args, &config).await?,
        Commands::Send(args) => trust_relay::cli::handle_send(args, &config).await?,
        Commands::Pending(args) => trust_relay::cli::handle_pending(args, &config).await?,
        Commands::Status(args) => trust_relay::cli::handle_status(args, &config)?,
    }

    Ok(())
}
