//! Inbound chat message as seen by the pipeline.

use serde::{Deserialize, Serialize};

/// A chat message with the metadata the pipeline needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: i64,
    /// Chat ID where this message was sent (negative = group, positive = DM).
    pub chat_id: i64,
    pub user_id: i64,
    pub username: String,
    pub timestamp: String,
    pub text: String,
    /// Sent by a bot account (including this bot).
    #[serde(default)]
    pub from_bot: bool,
}

/// Safely truncate a string at a char boundary.
pub fn truncate_safe(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl ChatMessage {
    /// Short single-line preview for logs.
    pub fn preview(&self, max_chars: usize) -> String {
        self.text
            .chars()
            .take(max_chars)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect()
    }

    /// Text bounded for inclusion in a generation prompt.
    pub fn bounded_text(&self, max_bytes: usize) -> &str {
        truncate_safe(&self.text, max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(text: &str) -> ChatMessage {
        ChatMessage {
            message_id: 1,
            chat_id: -100,
            user_id: 42,
            username: "alice".to_string(),
            timestamp: "10:00".to_string(),
            text: text.to_string(),
            from_bot: false,
        }
    }

    #[test]
    fn test_preview_flattens_newlines() {
        assert_eq!(msg("day 1\nwhat?").preview(50), "day 1 what?");
        assert_eq!(msg("abcdef").preview(3), "abc");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // "न" is three bytes in UTF-8
        let s = "aन";
        assert_eq!(truncate_safe(s, 2), "a");
        assert_eq!(truncate_safe(s, 4), "aन");
        assert_eq!(truncate_safe("short", 100), "short");
    }
}
