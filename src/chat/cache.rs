use std::collections::HashSet;

use super::{ChatError, ChatResult, Message, MessageId};

/// Ordered local copy of the collection. The message list on screen is a
/// projection of this, never the other way round.
#[derive(Debug, Clone, Default)]
pub struct MessageCache {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert in ascending `date` order. Returns false if the id is already
    /// present.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id.clone());

        // Most messages arrive in order, so appending is the common case
        if self
            .messages
            .last()
            .map_or(true, |last| last.date <= message.date)
        {
            self.messages.push(message);
        } else {
            // Land after any equal dates so arrival order breaks ties
            let pos = self
                .messages
                .partition_point(|existing| existing.date <= message.date);
            self.messages.insert(pos, message);
        }
        true
    }

    pub fn update_text(&mut self, id: &MessageId, text: &str) -> ChatResult<()> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;
        message.text = text.to_string();
        Ok(())
    }

    pub fn remove(&mut self, id: &MessageId) -> ChatResult<Message> {
        let pos = self
            .position(id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))?;
        self.ids.remove(id);
        Ok(self.messages.remove(pos))
    }

    pub fn get(&self, id: &MessageId) -> ChatResult<&Message> {
        self.messages
            .iter()
            .find(|m| &m.id == id)
            .ok_or_else(|| ChatError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn position(&self, id: &MessageId) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }
        self.messages.iter().position(|m| &m.id == id)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.ids.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
