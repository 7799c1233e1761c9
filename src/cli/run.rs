//! Run 命令 - 宿主事件循环
//!
//! 从 stdin 逐行读取 JSON 宿主事件，严格按到达顺序交给中继服务：
//!
//! ```text
//! {"type":"start"}
//! {"type":"notification","package_id":"com.kakao.talk","title":"홍길동","text":"안녕","post_time":1704102120000}
//! {"type":"connectivity","connected":false}
//! {"type":"stop"}
//! ```
//!
//! 格式错误的行只记录日志并跳过。

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::RelayStack;
use crate::config::RelayConfig;
use crate::relay::{DeliveryHandle, EventOutcome, RawEvent, RetryPolicy};

/// Run 命令参数
#[derive(Args)]
pub struct RunArgs {
    /// 只打印不发送（不读写状态文件）
    #[arg(long)]
    pub dry_run: bool,

    /// 不自动调用 on_start（等待输入中的 start 事件）
    #[arg(long)]
    pub no_auto_start: bool,
}

/// 宿主事件
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// 新通知
    Notification(NotificationInput),
    /// 监听连接建立
    Start,
    /// 监听连接断开
    Stop,
    /// 网络状态变化
    Connectivity { connected: bool },
}

/// 通知事件的原始字段
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationInput {
    pub package_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub big_text: Option<String>,
    #[serde(default)]
    pub text_lines: Vec<String>,
    /// Unix 毫秒，缺省时取当前时间
    #[serde(default)]
    pub post_time: Option<i64>,
}

impl NotificationInput {
    pub fn into_raw_event(self) -> RawEvent {
        let post_time = self.post_time.unwrap_or_else(|| Utc::now().timestamp_millis());
        RawEvent::from_extras(
            self.package_id,
            self.title,
            self.text,
            self.big_text,
            &self.text_lines,
            post_time,
        )
    }
}

/// 解析一行宿主事件
pub fn parse_host_event(line: &str) -> Result<HostEvent> {
    Ok(serde_json::from_str(line)?)
}

/// 事件循环统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HostLoopSummary {
    pub dispatched: usize,
    pub suppressed: usize,
    pub ignored: usize,
    pub malformed: usize,
    pub connectivity_changes: usize,
}

/// 停止通告最长等待时间（完整的重试窗口）
pub fn shutdown_grace(policy: &RetryPolicy) -> Duration {
    policy.retry_delay * policy.max_attempts.saturating_sub(1) + policy.attempt_timeout * policy.max_attempts
}

/// 处理单个宿主事件
///
/// 返回 stop 事件产生的停止通告句柄，退出前需要等待它
pub fn handle_host_event(
    stack: &RelayStack,
    event: HostEvent,
    summary: &mut HostLoopSummary,
) -> Option<DeliveryHandle> {
    match event {
        HostEvent::Notification(input) => match stack.service.on_event(&input.into_raw_event()) {
            EventOutcome::Dispatched(_) => summary.dispatched += 1,
            EventOutcome::Suppressed => summary.suppressed += 1,
            EventOutcome::IgnoredSender(_) => summary.ignored += 1,
        },
        HostEvent::Start => {
            stack.service.on_start();
        }
        HostEvent::Stop => return stack.service.on_stop(),
        HostEvent::Connectivity { connected } => {
            stack.recovery.on_connectivity_changed(connected);
            summary.connectivity_changes += 1;
        }
    }
    None
}

/// 运行事件循环直到输入结束或收到 Ctrl-C，然后发送停止通告
pub async fn run_host_loop<R>(stack: &RelayStack, reader: R, auto_start: bool) -> Result<HostLoopSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = HostLoopSummary::default();
    let mut stop_handle: Option<DeliveryHandle> = None;
    let mut lines = reader.lines();

    if auto_start {
        stack.service.on_start();
    }

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                None
            }
        };

        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_host_event(line) {
            Ok(event) => {
                if let Some(handle) = handle_host_event(stack, event, &mut summary) {
                    stop_handle = Some(handle);
                }
            }
            Err(e) => {
                warn!(error = %e, line = %line, "Malformed host event, skipped");
                summary.malformed += 1;
            }
        }
    }

    // 输入中已有 stop 事件时 on_stop 不会再次通告，沿用那次的句柄
    if let Some(handle) = stop_handle.or_else(|| stack.service.on_stop()) {
        let grace = shutdown_grace(&stack.delivery.policy());
        match tokio::time::timeout(grace, handle).await {
            Ok(Ok(outcome)) => info!(?outcome, "Stop announcement finished"),
            Ok(Err(e)) => warn!(error = %e, "Stop announcement task failed"),
            Err(_) => warn!("Stop announcement still in flight at exit"),
        }
    }

    Ok(summary)
}

/// 处理 run 命令
pub async fn handle_run(args: RunArgs, config: &RelayConfig) -> Result<()> {
    let stack = RelayStack::from_config(config, args.dry_run)?;
    info!(dry_run = args.dry_run, "Relay listening for host events on stdin");

    let reader = BufReader::new(tokio::io::stdin());
    let summary = run_host_loop(&stack, reader, !args.no_auto_start).await?;

    info!(
        dispatched = summary.dispatched,
        suppressed = summary.suppressed,
        ignored = summary.ignored,
        malformed = summary.malformed,
        "Relay stopped"
    );
    Ok(())
}
