//! 断网恢复 - 连通性变化时通告并重发待发送消息
//!
//! 只在状态发生翻转时才有动作：
//! - false → true：在同一个任务里先发"已恢复"通告，再重发待重发槽位中的消息，并清空槽位
//!   （通告需要重试时，重发会跟着推迟）
//! - true → false：发送"已断开"通告
//! - 状态不变：什么都不做
//!
//! 无论是否翻转，都会记录最新观察到的状态。

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::delivery::{DeliveryClient, DeliveryHandle, DeliveryOutcome};
use super::store::{PersistentStore, PENDING_MESSAGE_KEY, WAS_CONNECTED_KEY};

/// 连接恢复通告
pub const CONNECTIVITY_RESTORED_ANNOUNCEMENT: &str = "🌐 인터넷 연결이 복구되었습니다";
/// 连接断开通告
pub const CONNECTIVITY_LOST_ANNOUNCEMENT: &str = "📴 인터넷 연결이 끊어졌습니다";

/// 一次连通性事件的处理结果
#[derive(Debug)]
pub enum ConnectivityTransition {
    /// 断开 → 恢复
    Restored {
        /// 按顺序的投递结果：恢复通告，随后是重发（如果有）
        delivery: JoinHandle<Vec<DeliveryOutcome>>,
        /// 被重发的待重发消息
        resent: Option<String>,
    },
    /// 恢复 → 断开
    Lost { announcement: DeliveryHandle },
    /// 状态未变
    Unchanged,
}

/// 断网恢复协调器
pub struct RecoveryCoordinator {
    delivery: DeliveryClient,
    store: Arc<dyn PersistentStore>,
    /// 串行化连通状态的读-改-写
    guard: Mutex<()>,
}

impl RecoveryCoordinator {
    pub fn new(delivery: DeliveryClient, store: Arc<dyn PersistentStore>) -> Self {
        Self {
            delivery,
            store,
            guard: Mutex::new(()),
        }
    }

    pub fn on_connectivity_changed(&self, is_connected: bool) -> ConnectivityTransition {
        let _guard = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let was_connected = match self.store.get_bool(WAS_CONNECTED_KEY) {
            Ok(v) => v.unwrap_or(true),
            Err(e) => {
                warn!(error = %e, "Failed to read connectivity state, assuming connected");
                true
            }
        };

        if let Err(e) = self.store.put_bool(WAS_CONNECTED_KEY, is_connected) {
            warn!(error = %e, "Failed to persist connectivity state");
        }

        match (was_connected, is_connected) {
            (false, true) => {
                info!("Connectivity restored");
                let resent = self.take_pending();
                let mut contents = vec![CONNECTIVITY_RESTORED_ANNOUNCEMENT.to_string()];
                contents.extend(resent.clone());
                ConnectivityTransition::Restored {
                    delivery: self.delivery.send_sequence(contents),
                    resent,
                }
            }
            (true, false) => {
                info!("Connectivity lost");
                ConnectivityTransition::Lost {
                    announcement: self.delivery.send(CONNECTIVITY_LOST_ANNOUNCEMENT),
                }
            }
            _ => {
                debug!(is_connected, "Connectivity unchanged");
                ConnectivityTransition::Unchanged
            }
        }
    }

    /// 重发待重发消息，发出后立即清空槽位
    ///
    /// 重发本身失败时会经由正常的放弃路径重新写入槽位
    pub fn resend_pending(&self) -> Option<DeliveryHandle> {
        self.take_pending().map(|pending| self.delivery.send(pending))
    }

    /// 读出并清空待重发槽位
    fn take_pending(&self) -> Option<String> {
        let pending = match self.store.get_string(PENDING_MESSAGE_KEY) {
            Ok(Some(content)) if !content.is_empty() => content,
            Ok(_) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read pending message");
                return None;
            }
        };

        info!("Resending pending message");
        if let Err(e) = self.store.remove(PENDING_MESSAGE_KEY) {
            warn!(error = %e, "Failed to clear pending message");
        }

        Some(pending)
    }
}
