//! 中继数据模型 - 原始通知事件与规范化消息

use serde::{Deserialize, Serialize};

/// 消息分隔线（每条转发消息的第一行）
pub const MESSAGE_RULE: &str = "========================================";

/// 多行通知（InboxStyle）合并时使用的分隔符
pub const TEXT_LINES_SEPARATOR: &str = " | ";

/// 原始通知事件
///
/// 由宿主的事件源产生，只在一次处理流程中存活。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// 包名，如 `com.kakao.talk`
    pub package_id: String,
    /// 通知标题
    pub title: String,
    /// 正文候选（按优先级排列，第一个非空的生效）
    pub body_candidates: Vec<String>,
    /// 通知发布时间（Unix 毫秒）
    pub post_time_millis: i64,
}

impl RawEvent {
    pub fn new(
        package_id: impl Into<String>,
        title: impl Into<String>,
        body_candidates: Vec<String>,
        post_time_millis: i64,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            title: title.into(),
            body_candidates,
            post_time_millis,
        }
    }

    /// 从通知 extras 构建：正文 → 展开正文 → 多行正文（用 " | " 连接）
    pub fn from_extras(
        package_id: impl Into<String>,
        title: Option<String>,
        text: Option<String>,
        big_text: Option<String>,
        text_lines: &[String],
        post_time_millis: i64,
    ) -> Self {
        let mut body_candidates = Vec::with_capacity(3);
        body_candidates.extend(text);
        body_candidates.extend(big_text);
        if !text_lines.is_empty() {
            body_candidates.push(text_lines.join(TEXT_LINES_SEPARATOR));
        }

        Self::new(
            package_id,
            title.unwrap_or_default(),
            body_candidates,
            post_time_millis,
        )
    }
}

/// 规范化消息
///
/// 标题和正文已完成空白规整，且永远不为空。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub app_label: String,
    /// `HH:mm`，本地时区
    pub timestamp_text: String,
    pub title: String,
    pub body: String,
}

impl CanonicalMessage {
    /// 渲染为发送到 webhook 的文本
    ///
    /// ```text
    /// ========================================
    /// [카카오톡] 18:42
    ///  **홍길동**
    ///   안녕하세요
    /// ```
    pub fn render(&self) -> String {
        format!(
            "{}\n[{}] {}\n **{}**\n  {}",
            MESSAGE_RULE, self.app_label, self.timestamp_text, self.title, self.body
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extras_keeps_priority_order() {
        let lines = vec!["첫째".to_string(), "둘째".to_string()];
        let raw = RawEvent::from_extras(
            "com.kakao.talk",
            Some("제목".to_string()),
            Some("본문".to_string()),
            Some("긴 본문".to_string()),
            &lines,
            0,
        );

        assert_eq!(raw.body_candidates, vec!["본문", "긴 본문", "첫째 | 둘째"]);
        assert_eq!(raw.title, "제목");
    }

    #[test]
    fn test_from_extras_missing_fields() {
        let raw = RawEvent::from_extras("pkg", None, None, None, &[], 0);
        assert!(raw.body_candidates.is_empty());
        assert_eq!(raw.title, "");
    }

    #[test]
    fn test_render_layout() {
        let message = CanonicalMessage {
            app_label: "Gmail".to_string(),
            timestamp_text: "09:05".to_string(),
            title: "New mail".to_string(),
            body: "Hello there".to_string(),
        };

        assert_eq!(
            message.render(),
            "========================================\n[Gmail] 09:05\n **New mail**\n  Hello there"
        );
    }
}
