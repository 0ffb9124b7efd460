//! 消息正文组装与截断
//!
//! 正文格式：
//! ```text
//! 🚨 **CRITICAL: Intrusion Detection Alert**
//! **Host:** `web01`
//! **Event:** New SUID binary
//! **Time:** 2026-03-01 12:00:00
//! **Details:**
//! <详情前 500 字节，放在代码块中>
//! ```
//!
//! 整体超过 Discord 的 2000 字符限制时截断并加上标记。

use chrono::{Local, NaiveDateTime};

use crate::alert::Alert;

/// 详情最多保留的字节数
pub const DETAILS_BYTE_BUDGET: usize = 500;
/// Webhook 端 content 字段上限（字符）
pub const MAX_CONTENT_CHARS: usize = 2000;

const TRUNCATION_MARKER: &str = "\n…(truncated)";

/// 组装后的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub content: String,
    /// 正文整体被截断
    pub truncated: bool,
}

/// 使用当前本地时间组装
pub fn compose(alert: &Alert) -> ComposedMessage {
    compose_at(alert, Local::now().naive_local())
}

pub fn compose_at(alert: &Alert, now: NaiveDateTime) -> ComposedMessage {
    let mut content = format!(
        "{} **{}: Intrusion Detection Alert**\n",
        alert.severity.emoji(),
        alert.severity.as_str().to_uppercase()
    );
    content.push_str(&format!("**Host:** `{}`\n", alert.host));
    content.push_str(&format!("**Event:** {}\n", alert.message));
    content.push_str(&format!("**Time:** {}\n", now.format("%Y-%m-%d %H:%M:%S")));

    if let Some(details) = alert.details.as_deref().filter(|d| !d.is_empty()) {
        content.push_str(&format!(
            "**Details:**\n```\n{}\n```",
            truncate_bytes(details, DETAILS_BYTE_BUDGET)
        ));
    }

    if content.chars().count() <= MAX_CONTENT_CHARS {
        return ComposedMessage {
            content,
            truncated: false,
        };
    }

    let keep = MAX_CONTENT_CHARS - TRUNCATION_MARKER.chars().count();
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    ComposedMessage {
        content: truncated,
        truncated: true,
    }
}

/// 按字节截断，不切断 UTF-8 字符
pub fn truncate_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Severity;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_compose_basic_fields() {
        let alert = Alert::new(Severity::Critical, "New SUID binary", "web01");
        let message = compose_at(&alert, now());

        assert!(message.content.starts_with("🚨 **CRITICAL: Intrusion Detection Alert**"));
        assert!(message.content.contains("**Host:** `web01`"));
        assert!(message.content.contains("**Event:** New SUID binary"));
        assert!(message.content.contains("**Time:** 2026-03-01 12:00:00"));
        assert!(!message.content.contains("Details"));
        assert!(!message.truncated);
    }

    #[test]
    fn test_details_truncated_to_budget() {
        let details = "x".repeat(800);
        let alert = Alert::new(Severity::Warning, "log tamper", "db01").with_details(details);
        let message = compose_at(&alert, now());

        let block = message.content.split("```\n").nth(1).unwrap();
        let body = block.trim_end_matches("\n```");
        assert_eq!(body.len(), DETAILS_BYTE_BUDGET);
        assert!(!message.truncated);
    }

    #[test]
    fn test_oversized_body_truncated_and_marked() {
        let alert = Alert::new(Severity::Info, "m".repeat(3000), "db01");
        let message = compose_at(&alert, now());

        assert!(message.truncated);
        assert_eq!(message.content.chars().count(), MAX_CONTENT_CHARS);
        assert!(message.content.ends_with("…(truncated)"));
    }

    #[test]
    fn test_truncate_bytes_respects_char_boundary() {
        let s = "告警告警";
        // 每个汉字 3 字节
        assert_eq!(truncate_bytes(s, 4), "告");
        assert_eq!(truncate_bytes(s, 100), s);
    }
}
