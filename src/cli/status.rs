//! Status 命令 - 查看持久化状态

use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use clap::Args;
use serde::Serialize;

use super::format_output;
use crate::config::RelayConfig;
use crate::relay::store::{
    JsonFileStore, PersistentStore, LAST_STOPPED_TIME_KEY, PENDING_MESSAGE_KEY, WAS_CONNECTED_KEY,
};

/// Status 命令参数
#[derive(Args)]
pub struct StatusArgs {
    /// 输出 JSON 格式
    #[arg(long)]
    pub json: bool,
}

/// 持久化状态报告
#[derive(Debug, Serialize, PartialEq)]
pub struct StatusReport {
    pub state_file: String,
    pub pending_message: Option<String>,
    pub last_stopped_at: Option<DateTime<Local>>,
    pub was_connected: Option<bool>,
}

/// 读取状态（不需要 webhook 配置）
pub fn collect_status(store: &dyn PersistentStore, state_file: String) -> Result<StatusReport> {
    let last_stopped_at = store
        .get_i64(LAST_STOPPED_TIME_KEY)?
        .and_then(|ms| Local.timestamp_millis_opt(ms).single());

    Ok(StatusReport {
        state_file,
        pending_message: store.get_string(PENDING_MESSAGE_KEY)?,
        last_stopped_at,
        was_connected: store.get_bool(WAS_CONNECTED_KEY)?,
    })
}

/// 处理 status 命令
pub fn handle_status(args: StatusArgs, config: &RelayConfig) -> Result<()> {
    let store = JsonFileStore::in_dir(&config.data_dir);
    let report = collect_status(&store, store.path().display().to_string())?;
    println!("{}", format_output(&report, args.json));
    Ok(())
}
