//! 去重闸门 - 抑制紧邻重复的通知
//!
//! 事件源可能在极短时间内重复投递同一条更新通知。
//! 只记住上一条已接受的消息文本：与之完全相同则抑制，否则放行并替换。
//! 被其他消息隔开的重复不会被抑制。

use tracing::debug;

use super::event::CanonicalMessage;

/// 去重闸门
#[derive(Debug, Default)]
pub struct DeduplicationGate {
    /// 上一条放行的消息文本（渲染后的完整文本）
    last_message: Option<String>,
}

impl DeduplicationGate {
    pub fn new() -> Self {
        Self { last_message: None }
    }

    /// 检查是否应该抑制此消息
    ///
    /// 返回 `true` 表示与上一条完全相同（抑制，状态不变），
    /// `false` 表示放行并记住当前文本
    pub fn should_suppress(&mut self, message: &CanonicalMessage) -> bool {
        self.should_suppress_text(&message.render())
    }

    /// 以渲染后的文本为键进行比较
    pub fn should_suppress_text(&mut self, text: &str) -> bool {
        if self.last_message.as_deref() == Some(text) {
            debug!("Identical notification repeated back-to-back, suppressed");
            return true;
        }

        self.last_message = Some(text.to_string());
        false
    }

    /// 上一条放行的消息
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }
}
