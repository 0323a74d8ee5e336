use chrono::{DateTime, Local, TimeZone};

use super::{ChatError, ChatResult, MessageFields};

/// Fixed-width `hu-HU` style timestamp. Zero padded, so string order
/// matches time order.
pub const DEFAULT_DATE_FORMAT: &str = "%Y. %m. %d. %H:%M:%S";

/// A message about to be sent. It has no id until the store assigns one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub username: String,
    pub text: String,
}

impl Draft {
    pub fn new(text: &str, nickname: &str, fallback_nickname: &str) -> ChatResult<Self> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let nickname = nickname.trim();
        let username = if nickname.is_empty() {
            fallback_nickname
        } else {
            nickname
        };

        Ok(Self {
            username: username.to_string(),
            text: text.to_string(),
        })
    }

    /// Stamp with the current local time.
    pub fn stamp(self, date_format: &str) -> MessageFields {
        self.stamp_at(&Local::now(), date_format)
    }

    pub fn stamp_at<Tz>(self, at: &DateTime<Tz>, date_format: &str) -> MessageFields
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        MessageFields {
            username: self.username,
            text: self.text,
            date: at.format(date_format).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(
            Draft::new("   ", "alice", "guest"),
            Err(ChatError::EmptyMessage)
        ));
    }

    #[test]
    fn blank_nickname_falls_back() {
        let draft = Draft::new("hi", "  ", "guest42").unwrap();
        assert_eq!(draft.username, "guest42");
    }

    #[test]
    fn text_is_sent_as_typed() {
        let draft = Draft::new("  indented\t", "alice", "guest").unwrap();
        assert_eq!(draft.text, "  indented\t");
    }

    #[test]
    fn default_format_sorts_like_time() {
        let early = Utc.with_ymd_and_hms(2024, 3, 5, 9, 3, 7).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 5, 14, 3, 7).unwrap();

        let a = Draft::new("a", "alice", "x")
            .unwrap()
            .stamp_at(&early, DEFAULT_DATE_FORMAT);
        let b = Draft::new("b", "alice", "x")
            .unwrap()
            .stamp_at(&late, DEFAULT_DATE_FORMAT);

        assert_eq!(a.date, "2024. 03. 05. 09:03:07");
        assert!(a.date < b.date);
    }
}
