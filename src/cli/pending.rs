//! Pending 命令 - 查看、清空或重发待重发消息

use anyhow::Result;
use clap::Args;

use super::RelayStack;
use crate::config::RelayConfig;
use crate::relay::store::{JsonFileStore, PersistentStore, PENDING_MESSAGE_KEY};

/// Pending 命令参数
#[derive(Args)]
pub struct PendingArgs {
    /// 清空待重发槽位
    #[arg(long, conflicts_with = "resend")]
    pub clear: bool,

    /// 立即重发并等待结果
    #[arg(long)]
    pub resend: bool,
}

/// 处理 pending 命令
pub async fn handle_pending(args: PendingArgs, config: &RelayConfig) -> Result<()> {
    if args.resend {
        let stack = RelayStack::from_config(config, false)?;
        match stack.recovery.resend_pending() {
            Some(handle) => {
                let outcome = handle.await?;
                println!("重发结果: {:?}", outcome);
            }
            None => println!("没有待重发消息"),
        }
        return Ok(());
    }

    let store = JsonFileStore::in_dir(&config.data_dir);
    if args.clear {
        store.remove(PENDING_MESSAGE_KEY)?;
        println!("已清空待重发消息");
        return Ok(());
    }

    match store.get_string(PENDING_MESSAGE_KEY)? {
        Some(content) => println!("{}", content),
        None => println!("没有待重发消息"),
    }
    Ok(())
}
