//! 消息格式化 - RawEvent → CanonicalMessage
//!
//! 纯函数，无副作用：
//! 1. 正文取第一个非空候选
//! 2. 标题/正文空白规整（连续空白折叠为一个空格，去首尾）
//! 3. 空标题/空正文替换为占位符
//! 4. 时间戳按 `HH:mm` 渲染，不带时区名

use chrono::{Local, TimeZone};
use regex::Regex;
use std::sync::OnceLock;

use super::event::{CanonicalMessage, RawEvent};

/// 空标题/空正文的占位符
pub const EMPTY_PLACEHOLDER: &str = "-";

/// 时间戳无法解析时的占位符
pub const UNKNOWN_TIME: &str = "--:--";

const TIME_PATTERN: &str = "%H:%M";

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

/// 折叠空白并去除首尾空白（换行同样视为空白）
pub fn normalize_whitespace(s: &str) -> String {
    whitespace_regex().replace_all(s.trim(), " ").into_owned()
}

/// 规整后为空则返回占位符
fn or_placeholder(s: String) -> String {
    if s.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        s
    }
}

/// 消息格式化器
#[derive(Debug, Clone, Default)]
pub struct MessageFormatter;

impl MessageFormatter {
    pub fn new() -> Self {
        Self
    }

    /// 使用本地时区格式化
    pub fn format(&self, raw: &RawEvent, app_label: &str) -> CanonicalMessage {
        self.format_in(raw, app_label, &Local)
    }

    /// 使用指定时区格式化（测试用固定时区）
    pub fn format_in<Tz>(&self, raw: &RawEvent, app_label: &str, tz: &Tz) -> CanonicalMessage
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let body = Self::select_body(&raw.body_candidates);

        CanonicalMessage {
            app_label: app_label.to_string(),
            timestamp_text: Self::format_time(raw.post_time_millis, tz),
            title: or_placeholder(normalize_whitespace(&raw.title)),
            body: or_placeholder(normalize_whitespace(body)),
        }
    }

    /// 选取第一个非空白的正文候选
    ///
    /// 只含空白的候选视同为空，继续看下一个（空白的 text 会落到 big_text / text_lines）
    fn select_body(candidates: &[String]) -> &str {
        candidates
            .iter()
            .map(String::as_str)
            .find(|c| !c.trim().is_empty())
            .unwrap_or("")
    }

    fn format_time<Tz>(millis: i64, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        match tz.timestamp_millis_opt(millis).single() {
            Some(dt) => dt.format(TIME_PATTERN).to_string(),
            None => UNKNOWN_TIME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn kst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn raw(title: &str, bodies: &[&str]) -> RawEvent {
        RawEvent::new(
            "com.kakao.talk",
            title,
            bodies.iter().map(|s| s.to_string()).collect(),
            // 2024-01-01 09:42:00 UTC
            1_704_102_120_000,
        )
    }

    #[test]
    fn test_title_whitespace_is_collapsed() {
        let msg = MessageFormatter::new().format_in(&raw("  Hello\n\nWorld  ", &["x"]), "카카오톡", &kst());
        assert_eq!(msg.title, "Hello World");
    }

    #[test]
    fn test_body_line_breaks_become_spaces() {
        let msg = MessageFormatter::new().format_in(&raw("t", &["line one\nline two\r\n\tthree"]), "a", &kst());
        assert_eq!(msg.body, "line one line two three");
    }

    #[test]
    fn test_first_non_empty_body_wins() {
        let msg = MessageFormatter::new().format_in(&raw("t", &["", "  ", "expanded", "a | b"]), "a", &kst());
        assert_eq!(msg.body, "expanded");
    }

    #[test]
    fn test_empty_fields_use_placeholder() {
        let msg = MessageFormatter::new().format_in(&raw(" \n ", &["", ""]), "a", &kst());
        assert_eq!(msg.title, EMPTY_PLACEHOLDER);
        assert_eq!(msg.body, EMPTY_PLACEHOLDER);

        let msg = MessageFormatter::new().format_in(&raw("", &[]), "a", &kst());
        assert_eq!(msg.body, EMPTY_PLACEHOLDER);
    }

    #[test]
    fn test_timestamp_in_given_timezone() {
        let msg = MessageFormatter::new().format_in(&raw("t", &["b"]), "a", &kst());
        assert_eq!(msg.timestamp_text, "18:42");

        let utc = FixedOffset::east_opt(0).unwrap();
        let msg = MessageFormatter::new().format_in(&raw("t", &["b"]), "a", &utc);
        assert_eq!(msg.timestamp_text, "09:42");
    }

    #[test]
    fn test_out_of_range_timestamp() {
        let event = RawEvent::new("pkg", "t", vec![], i64::MAX);
        let msg = MessageFormatter::new().format_in(&event, "a", &kst());
        assert_eq!(msg.timestamp_text, UNKNOWN_TIME);
    }

    #[test]
    fn test_format_is_idempotent() {
        let formatter = MessageFormatter::new();
        let event = raw("  Hi \t there ", &["", "multi\n\nline  body"]);

        let first = formatter.format_in(&event, "카카오톡", &kst());
        let second = formatter.format_in(&event, "카카오톡", &kst());
        assert_eq!(first, second);

        // 对已规整的字段再次规整不会改变结果
        let again = RawEvent::new("com.kakao.talk", first.title.clone(), vec![first.body.clone()], event.post_time_millis);
        assert_eq!(formatter.format_in(&again, "카카오톡", &kst()), first);
    }
}
