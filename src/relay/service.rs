//! 中继服务 - 事件 → 格式化 → 去重 → 投递，以及启动/停止通告
//!
//! 事件必须按到达顺序处理：去重闸门和启动/停止闩锁都依赖顺序。
//! 启动通告和停止通告各自每个实例最多发送一次。

use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::deduplicator::DeduplicationGate;
use super::delivery::{DeliveryClient, DeliveryHandle, DeliveryOutcome};
use super::event::RawEvent;
use super::formatter::MessageFormatter;
use super::label::AppLabels;
use super::store::{PersistentStore, LAST_STOPPED_TIME_KEY};

/// 启动通告
pub const STARTED_ANNOUNCEMENT: &str = "============== Trust 시작됨 ==============\n";
/// 停止通告
pub const STOPPED_ANNOUNCEMENT: &str = "============== Trust 중단됨 ==============\n";

/// 默认忽略的发送方（系统级通知）
pub const DEFAULT_IGNORED_LABELS: &[&str] = &["Android 시스템", "시스템 UI"];

/// 停机时长，按分+秒渲染（向下取整）
pub fn format_downtime(elapsed_millis: i64) -> String {
    let total_secs = elapsed_millis.max(0) / 1000;
    format!("{}분 {}초", total_secs / 60, total_secs % 60)
}

/// 停机时长通告
pub fn downtime_announcement(elapsed_millis: i64) -> String {
    format!("⏱️ 중단되어 있던 시간: {}", format_downtime(elapsed_millis))
}

/// 进程内生命周期状态（每个服务实例一份）
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LifecycleState {
    pub has_notified_start: bool,
    pub has_notified_stop: bool,
    /// 启动时读到的上次停止时间
    pub last_stopped_time_millis: Option<i64>,
}

/// 单个事件的处理结果
#[derive(Debug)]
pub enum EventOutcome {
    /// 发送方在忽略列表中
    IgnoredSender(String),
    /// 与上一条完全相同
    Suppressed,
    /// 已交给投递客户端
    Dispatched(DeliveryHandle),
}

/// 中继服务
pub struct RelayService {
    labels: AppLabels,
    ignored_labels: HashSet<String>,
    formatter: MessageFormatter,
    gate: Mutex<DeduplicationGate>,
    lifecycle: Mutex<LifecycleState>,
    delivery: DeliveryClient,
    store: Arc<dyn PersistentStore>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RelayService {
    pub fn new(labels: AppLabels, delivery: DeliveryClient, store: Arc<dyn PersistentStore>) -> Self {
        Self {
            labels,
            ignored_labels: DEFAULT_IGNORED_LABELS.iter().map(|s| s.to_string()).collect(),
            formatter: MessageFormatter::new(),
            gate: Mutex::new(DeduplicationGate::new()),
            lifecycle: Mutex::new(LifecycleState::default()),
            delivery,
            store,
        }
    }

    /// 替换忽略列表
    pub fn with_ignored_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// 当前生命周期状态快照
    pub fn lifecycle(&self) -> LifecycleState {
        lock(&self.lifecycle).clone()
    }

    /// 处理一条通知
    pub fn on_event(&self, raw: &RawEvent) -> EventOutcome {
        let app_label = self.labels.resolve_label(&raw.package_id);

        if self.ignored_labels.contains(&app_label) {
            debug!(app_label = %app_label, "Ignored sender, dropping notification");
            return EventOutcome::IgnoredSender(app_label);
        }

        let message = self.formatter.format(raw, &app_label);
        let text = message.render();
        debug!(package_id = %raw.package_id, message = %text, "Notification captured");

        if lock(&self.gate).should_suppress_text(&text) {
            return EventOutcome::Suppressed;
        }

        EventOutcome::Dispatched(self.delivery.send(text))
    }

    /// 宿主连接建立时调用
    pub fn on_start(&self) -> Option<JoinHandle<Vec<DeliveryOutcome>>> {
        self.on_start_at(Utc::now().timestamp_millis())
    }

    /// 指定当前时间的 on_start（测试用）
    ///
    /// 首次调用发送启动通告；如有上次停止时间，紧接着发送停机时长通告
    pub fn on_start_at(&self, now_millis: i64) -> Option<JoinHandle<Vec<DeliveryOutcome>>> {
        let last_stopped = {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.has_notified_start {
                debug!("Start already announced, skipping");
                return None;
            }
            lifecycle.has_notified_start = true;

            let last_stopped = self.read_last_stopped();
            lifecycle.last_stopped_time_millis = last_stopped;
            last_stopped
        };

        let mut announcements = vec![STARTED_ANNOUNCEMENT.to_string()];
        if let Some(stopped_at) = last_stopped.filter(|t| *t > 0) {
            let elapsed = now_millis - stopped_at;
            info!(downtime = %format_downtime(elapsed), "Relay restarted after downtime");
            announcements.push(downtime_announcement(elapsed));
        } else {
            info!("Relay started");
        }

        Some(self.delivery.send_sequence(announcements))
    }

    /// 宿主连接断开时调用
    pub fn on_stop(&self) -> Option<DeliveryHandle> {
        self.on_stop_at(Utc::now().timestamp_millis())
    }

    /// 指定当前时间的 on_stop（测试用）
    ///
    /// 先发出停止通告，再记录停止时间
    pub fn on_stop_at(&self, now_millis: i64) -> Option<DeliveryHandle> {
        {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.has_notified_stop {
                debug!("Stop already announced, skipping");
                return None;
            }
            lifecycle.has_notified_stop = true;
        }

        info!("Relay stopping");
        let handle = self.delivery.send(STOPPED_ANNOUNCEMENT);

        if let Err(e) = self.store.put_i64(LAST_STOPPED_TIME_KEY, now_millis) {
            warn!(error = %e, "Failed to record stop time");
        }

        Some(handle)
    }

    fn read_last_stopped(&self) -> Option<i64> {
        match self.store.get_i64(LAST_STOPPED_TIME_KEY) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Failed to read last stop time");
                None
            }
        }
    }
}
