use super::MessageId;
use crate::input::TextField;

/// Popup editing the text of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOverlay {
    target: MessageId,
    pub field: TextField,
}

impl EditOverlay {
    pub fn open(target: MessageId, current_text: &str) -> Self {
        Self {
            target,
            field: TextField::with_value(current_text),
        }
    }

    pub fn target(&self) -> &MessageId {
        &self.target
    }

    pub fn value(&self) -> &str {
        self.field.value()
    }
}
