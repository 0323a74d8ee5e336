use std::ops::Range;

use super::{MessageCache, MessageId};

/// Scroll and selection state of the message list.
///
/// Delete and edit keys act on the selected id rather than on anything
/// bound to a row, so rows added by any code path get the same behaviour.
#[derive(Debug, Clone, Default)]
pub struct ListViewport {
    offset: usize,
    height: usize,
    reveal_pending: bool,
    selected: Option<MessageId>,
}

impl ListViewport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn selected(&self) -> Option<&MessageId> {
        self.selected.as_ref()
    }

    /// Ask for the newest row to be shown at the bottom edge on next layout.
    pub fn request_reveal_latest(&mut self) {
        self.reveal_pending = true;
    }

    /// Fit the viewport to `total` rows in `height` lines and return the
    /// visible row range. A pending reveal only scrolls if the last row is
    /// not already on screen.
    pub fn layout(&mut self, total: usize, height: usize) -> Range<usize> {
        self.height = height;
        let max_offset = total.saturating_sub(height);

        if self.reveal_pending {
            self.reveal_pending = false;
            let last = total.checked_sub(1);
            let last_visible =
                last.map_or(false, |last| last >= self.offset && last < self.offset + height);
            if !last_visible {
                self.offset = max_offset;
            }
        }

        self.offset = self.offset.min(max_offset);
        let end = (self.offset + height).min(total);
        self.offset..end
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.offset = self.offset.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.offset += lines;
    }

    pub fn select_prev(&mut self, cache: &MessageCache) {
        let index = match self.selected_index(cache) {
            Some(i) => i.saturating_sub(1),
            None if cache.is_empty() => return,
            None => cache.len() - 1,
        };
        self.select_index(cache, index);
    }

    pub fn select_next(&mut self, cache: &MessageCache) {
        let Some(i) = self.selected_index(cache) else {
            return;
        };
        if i + 1 < cache.len() {
            self.select_index(cache, i + 1);
        } else {
            self.selected = None;
            self.request_reveal_latest();
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Drop the selection if its message is gone.
    pub fn sync_with(&mut self, cache: &MessageCache) {
        if let Some(id) = &self.selected {
            if !cache.contains(id) {
                self.selected = None;
            }
        }
    }

    fn selected_index(&self, cache: &MessageCache) -> Option<usize> {
        self.selected.as_ref().and_then(|id| cache.position(id))
    }

    fn select_index(&mut self, cache: &MessageCache, index: usize) {
        self.selected = cache.messages().get(index).map(|m| m.id.clone());
        if index < self.offset {
            self.offset = index;
        } else if self.height > 0 && index >= self.offset + self.height {
            self.offset = index + 1 - self.height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Message;

    fn cache_with(n: usize) -> MessageCache {
        let mut cache = MessageCache::new();
        for i in 0..n {
            cache.insert(Message {
                id: MessageId::new(format!("m{i}")),
                username: "bob".to_string(),
                text: format!("line {i}"),
                date: format!("2024. 01. 01. 00:00:{i:02}"),
            });
        }
        cache
    }

    #[test]
    fn reveal_scrolls_only_when_needed() {
        let mut view = ListViewport::new();
        view.request_reveal_latest();
        assert_eq!(view.layout(3, 5), 0..3);

        view.request_reveal_latest();
        assert_eq!(view.layout(8, 5), 3..8);

        // Scrolled up, last row hidden: reveal jumps back down
        view.scroll_up(2);
        assert_eq!(view.layout(8, 5), 1..6);
        view.request_reveal_latest();
        assert_eq!(view.layout(9, 5), 4..9);
    }

    #[test]
    fn reveal_leaves_offset_alone_when_last_row_visible() {
        let mut view = ListViewport::new();
        view.layout(4, 10);
        view.request_reveal_latest();
        assert_eq!(view.layout(5, 10), 0..5);
        assert_eq!(view.offset(), 0);
    }

    #[test]
    fn reveal_on_empty_list_is_a_no_op() {
        let mut view = ListViewport::new();
        view.request_reveal_latest();
        assert_eq!(view.layout(0, 5), 0..0);
        assert_eq!(view.offset(), 0);
    }

    #[test]
    fn selection_walks_rows_and_follows_removals() {
        let mut cache = cache_with(3);
        let mut view = ListViewport::new();
        view.layout(3, 2);

        view.select_prev(&cache);
        assert_eq!(view.selected().map(|id| id.as_str()), Some("m2"));
        view.select_prev(&cache);
        view.select_prev(&cache);
        view.select_prev(&cache);
        assert_eq!(view.selected().map(|id| id.as_str()), Some("m0"));
        assert_eq!(view.offset(), 0);

        view.select_next(&cache);
        assert_eq!(view.selected().map(|id| id.as_str()), Some("m1"));

        cache.remove(&MessageId::new("m1")).unwrap();
        view.sync_with(&cache);
        assert!(view.selected().is_none());
    }
}
