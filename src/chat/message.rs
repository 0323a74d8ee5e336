use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque document id assigned by the store on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Document body as stored remotely. The text is kept under `message`
/// to match the shape existing collections already use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFields {
    pub username: String,
    #[serde(rename = "message")]
    pub text: String,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub username: String,
    pub text: String,
    pub date: String,
}

impl Message {
    pub fn from_fields(id: MessageId, fields: MessageFields) -> Self {
        Self {
            id,
            username: fields.username,
            text: fields.text,
            date: fields.date,
        }
    }

    pub fn fields(&self) -> MessageFields {
        MessageFields {
            username: self.username.clone(),
            text: self.text.clone(),
            date: self.date.clone(),
        }
    }
}

/// Partial update. `date` and `username` are fixed at creation, so only
/// the text can be patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(rename = "message", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessagePatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn apply(&self, fields: &mut MessageFields) {
        if let Some(text) = &self.text {
            fields.text = text.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(Message),
    Modified(Message),
    Removed(Message),
}

/// One delivery from a live query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub fn new(changes: Vec<ChangeEvent>) -> Self {
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_serialize_text_as_message() {
        let fields = MessageFields {
            username: "alice".to_string(),
            text: "hi".to_string(),
            date: "2024. 03. 05. 14:03:07".to_string(),
        };
        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["message"], "hi");
        assert_eq!(json["username"], "alice");
        assert!(json.get("text").is_none());
    }

    #[test]
    fn patch_only_touches_text() {
        let mut fields = MessageFields {
            username: "alice".to_string(),
            text: "hi".to_string(),
            date: "2024. 03. 05. 14:03:07".to_string(),
        };
        MessagePatch::text("hello").apply(&mut fields);
        assert_eq!(fields.text, "hello");
        assert_eq!(fields.date, "2024. 03. 05. 14:03:07");

        MessagePatch::default().apply(&mut fields);
        assert_eq!(fields.text, "hello");
    }
}
