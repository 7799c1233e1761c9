//! Send 命令 - 手动发送一条消息（经同样的重试/持久化路径）

use anyhow::Result;
use clap::Args;

use super::RelayStack;
use crate::config::RelayConfig;
use crate::relay::DeliveryOutcome;

/// Send 命令参数
#[derive(Args)]
pub struct SendArgs {
    /// 消息内容
    pub content: String,

    /// 只打印不发送
    #[arg(long)]
    pub dry_run: bool,
}

/// 处理 send 命令，等待最终结果
pub async fn handle_send(args: SendArgs, config: &RelayConfig) -> Result<()> {
    let stack = RelayStack::from_config(config, args.dry_run)?;

    match stack.delivery.deliver(args.content).await {
        DeliveryOutcome::Delivered { attempts } => {
            println!("已发送（尝试 {} 次）", attempts);
        }
        DeliveryOutcome::Abandoned { attempts } => {
            println!("发送失败（尝试 {} 次），已保存为待重发消息", attempts);
        }
    }
    Ok(())
}
