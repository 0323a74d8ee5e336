use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    ChangeBatch, ChangeEvent, ChatError, ChatResult, Draft, EditOverlay, ListViewport,
    MessageCache, MessageId, MessagePatch,
};
use crate::store::{LiveQuery, MessageStore, Query, StoreResult};

/// A store call running on its own task. The UI drops these; nothing
/// cancels a call once issued.
pub type RemoteCall<T> = JoinHandle<StoreResult<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not subscribed yet.
    Idle,
    /// Subscribed; the next batch is the snapshot already painted by the
    /// initial fetch.
    AwaitingFirstSnapshot,
    Live,
}

/// Keeps the local message list in step with the store's live query.
pub struct SyncController {
    store: Arc<dyn MessageStore>,
    query: Query,
    phase: SyncPhase,
    cache: MessageCache,
    view: ListViewport,
    overlay: Option<EditOverlay>,
    live: Option<LiveQuery>,
    date_format: String,
    status_tx: mpsc::UnboundedSender<String>,
    /// Ids with a delete call out and no `Removed` echo yet.
    pending_deletes: Arc<Mutex<HashSet<MessageId>>>,
}

impl SyncController {
    pub fn new(
        store: Arc<dyn MessageStore>,
        collection: &str,
        date_format: &str,
        status_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self {
            store,
            query: Query::by_date(collection),
            phase: SyncPhase::Idle,
            cache: MessageCache::new(),
            view: ListViewport::new(),
            overlay: None,
            live: None,
            date_format: date_format.to_string(),
            status_tx,
            pending_deletes: Arc::default(),
        }
    }

    /// Paint everything the collection holds, then open the live query.
    pub async fn start(&mut self) -> ChatResult<()> {
        let messages = self.store.list_records(&self.query).await?;
        info!(
            "initial fetch of {} returned {} messages",
            self.query.collection,
            messages.len()
        );

        self.cache.clear();
        for message in messages {
            self.cache.insert(message);
        }
        self.view.request_reveal_latest();

        self.live = Some(self.store.subscribe_live_query(&self.query).await?);
        self.phase = SyncPhase::AwaitingFirstSnapshot;
        Ok(())
    }

    /// Apply every batch that has already arrived. Returns how many were
    /// applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(batch) = self.live.as_mut().and_then(|live| live.try_recv()) {
            self.apply_batch(batch);
            applied += 1;
        }
        applied
    }

    /// Wait for the next batch and apply it. `Ok(false)` once the live
    /// query has ended.
    pub async fn next_batch(&mut self) -> ChatResult<bool> {
        let live = self.live.as_mut().ok_or(ChatError::NotStarted)?;
        match live.recv().await {
            Some(batch) => {
                self.apply_batch(batch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn apply_batch(&mut self, batch: ChangeBatch) {
        let first = self.phase == SyncPhase::AwaitingFirstSnapshot;
        if first {
            self.phase = SyncPhase::Live;
        }

        let mut suppressed = 0;
        let mut snapshot_ids = HashSet::new();
        for change in batch.changes {
            match change {
                ChangeEvent::Added(message) => {
                    let id = message.id.clone();
                    if first {
                        snapshot_ids.insert(id.clone());
                    }
                    if self.cache.insert(message) {
                        if first {
                            debug!("snapshot carried {id} missing from the initial fetch");
                        }
                        self.view.request_reveal_latest();
                    } else if first {
                        suppressed += 1;
                    } else {
                        debug!("ignoring repeated add of {id}");
                    }
                }
                ChangeEvent::Modified(message) => {
                    if let Err(e) = self.cache.update_text(&message.id, &message.text) {
                        debug!("modify skipped: {e}");
                    }
                }
                ChangeEvent::Removed(message) => {
                    if let Err(e) = self.drop_row(&message.id) {
                        warn!("remove skipped: {e}");
                    }
                }
            }
        }

        if first {
            debug!("suppressed {suppressed} snapshot entries already on screen");

            // Rows deleted between the initial fetch and the subscription
            // never get a `Removed` of their own
            let stale: Vec<MessageId> = self
                .cache
                .messages()
                .iter()
                .filter(|m| !snapshot_ids.contains(&m.id))
                .map(|m| m.id.clone())
                .collect();
            for id in stale {
                debug!("snapshot no longer has {id}");
                let _ = self.drop_row(&id);
            }
        }
    }

    /// Remove a row and everything that points at it.
    fn drop_row(&mut self, id: &MessageId) -> ChatResult<()> {
        self.cache.remove(id)?;
        self.view.sync_with(&self.cache);
        if let Ok(mut pending) = self.pending_deletes.lock() {
            pending.remove(id);
        }
        if self.overlay.as_ref().map(|o| o.target()) == Some(id) {
            self.overlay = None;
            let _ = self
                .status_tx
                .send("Message was deleted while being edited".to_string());
        }
        Ok(())
    }

    /// Send a new message. It shows up once the live query echoes it.
    pub fn submit(&mut self, draft: Draft) -> RemoteCall<MessageId> {
        let fields = draft.stamp(&self.date_format);
        let store = self.store.clone();
        let collection = self.query.collection.clone();
        self.spawn_remote("Send".to_string(), async move {
            store.create_record(&collection, fields).await
        })
    }

    /// Delete a message remotely. The row goes away when the removal is
    /// echoed back.
    pub fn delete(&mut self, id: &MessageId) -> ChatResult<RemoteCall<()>> {
        if !self.cache.contains(id) {
            return Err(ChatError::NotFound(id.clone()));
        }
        if let Ok(mut pending) = self.pending_deletes.lock() {
            if !pending.insert(id.clone()) {
                return Err(ChatError::DeletePending(id.clone()));
            }
        }

        let store = self.store.clone();
        let collection = self.query.collection.clone();
        let pending = self.pending_deletes.clone();
        let id = id.clone();
        Ok(self.spawn_remote(format!("Delete of {id}"), async move {
            let result = store.delete_record(&collection, &id).await;
            if result.is_err() {
                // Let the user try again
                if let Ok(mut pending) = pending.lock() {
                    pending.remove(&id);
                }
            }
            result
        }))
    }

    /// Open the edit popup for `id`, seeded from the cached text.
    pub fn open_edit(&mut self, id: &MessageId) -> ChatResult<&mut EditOverlay> {
        if let Some(open) = &self.overlay {
            return Err(ChatError::OverlayBusy(open.target().clone()));
        }
        let text = self.cache.get(id)?.text.clone();
        Ok(self.overlay.insert(EditOverlay::open(id.clone(), &text)))
    }

    /// Apply the popup text locally, send it, and close the popup. A failed
    /// update is reported but the local text is not rolled back. Blank text
    /// is refused and the popup stays open.
    pub fn save_edit(&mut self) -> ChatResult<RemoteCall<()>> {
        let open = self.overlay.as_ref().ok_or(ChatError::NoOverlay)?;
        if open.value().trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let overlay = self.overlay.take().ok_or(ChatError::NoOverlay)?;
        let id = overlay.target().clone();
        let text = overlay.value().to_string();
        self.cache.update_text(&id, &text)?;

        let store = self.store.clone();
        let collection = self.query.collection.clone();
        Ok(self.spawn_remote(format!("Edit of {id}"), async move {
            store
                .update_record(&collection, &id, MessagePatch::text(text))
                .await
        }))
    }

    pub fn is_delete_pending(&self, id: &MessageId) -> bool {
        self.pending_deletes
            .lock()
            .map(|pending| pending.contains(id))
            .unwrap_or(false)
    }

    pub fn close_edit(&mut self) -> ChatResult<()> {
        self.overlay.take().map(|_| ()).ok_or(ChatError::NoOverlay)
    }

    pub fn overlay(&self) -> Option<&EditOverlay> {
        self.overlay.as_ref()
    }

    pub fn overlay_mut(&mut self) -> Option<&mut EditOverlay> {
        self.overlay.as_mut()
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn cache(&self) -> &MessageCache {
        &self.cache
    }

    pub fn view(&self) -> &ListViewport {
        &self.view
    }

    /// Cache and viewport together, for layout and selection moves.
    pub fn view_parts(&mut self) -> (&MessageCache, &mut ListViewport) {
        (&self.cache, &mut self.view)
    }

    pub fn collection(&self) -> &str {
        &self.query.collection
    }

    fn spawn_remote<T, F>(&self, what: String, call: F) -> RemoteCall<T>
    where
        T: Send + 'static,
        F: Future<Output = StoreResult<T>> + Send + 'static,
    {
        let status_tx = self.status_tx.clone();
        tokio::spawn(async move {
            let result = call.await;
            if let Err(e) = &result {
                warn!("{what} failed: {e}");
                let _ = status_tx.send(format!("{what} failed: {e}"));
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageFields;
    use crate::store::MemoryStore;

    fn controller(store: &MemoryStore) -> (SyncController, mpsc::UnboundedReceiver<String>) {
        let (status_tx, status_rx) = mpsc::unbounded_channel();
        let controller = SyncController::new(
            Arc::new(store.clone()),
            "messages",
            "%Y. %m. %d. %H:%M:%S",
            status_tx,
        );
        (controller, status_rx)
    }

    fn fields(text: &str, date: &str) -> MessageFields {
        MessageFields {
            username: "alice".to_string(),
            text: text.to_string(),
            date: date.to_string(),
        }
    }

    #[tokio::test]
    async fn first_snapshot_is_not_rendered_twice() {
        let store = MemoryStore::new();
        store
            .create_record("messages", fields("one", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();
        store
            .create_record("messages", fields("two", "2024. 01. 01. 10:00:02"))
            .await
            .unwrap();

        let (mut sync, _status) = controller(&store);
        sync.start().await.unwrap();
        assert_eq!(sync.phase(), SyncPhase::AwaitingFirstSnapshot);
        assert_eq!(sync.cache().len(), 2);

        assert!(sync.next_batch().await.unwrap());
        assert_eq!(sync.phase(), SyncPhase::Live);
        assert_eq!(sync.cache().len(), 2);
    }

    #[tokio::test]
    async fn modified_refreshes_cached_text() {
        let store = MemoryStore::new();
        let id = store
            .create_record("messages", fields("one", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();

        let (mut sync, _status) = controller(&store);
        sync.start().await.unwrap();
        sync.poll();

        store
            .update_record("messages", &id, MessagePatch::text("uno"))
            .await
            .unwrap();
        sync.next_batch().await.unwrap();
        assert_eq!(sync.cache().get(&id).unwrap().text, "uno");
        assert_eq!(sync.cache().get(&id).unwrap().date, "2024. 01. 01. 10:00:01");
    }

    #[tokio::test]
    async fn second_edit_is_refused_while_one_is_open() {
        let store = MemoryStore::new();
        let a = store
            .create_record("messages", fields("a", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();
        let b = store
            .create_record("messages", fields("b", "2024. 01. 01. 10:00:02"))
            .await
            .unwrap();

        let (mut sync, _status) = controller(&store);
        sync.start().await.unwrap();

        assert_eq!(sync.open_edit(&a).unwrap().value(), "a");
        assert!(matches!(sync.open_edit(&b), Err(ChatError::OverlayBusy(id)) if id == a));

        sync.close_edit().unwrap();
        assert!(sync.overlay().is_none());
        assert!(matches!(sync.close_edit(), Err(ChatError::NoOverlay)));
        assert_eq!(sync.cache().get(&a).unwrap().text, "a");
        assert!(sync.open_edit(&b).is_ok());
    }

    #[tokio::test]
    async fn unknown_ids_surface_not_found() {
        let store = MemoryStore::new();
        let (mut sync, _status) = controller(&store);
        sync.start().await.unwrap();

        let ghost = MessageId::new("ghost");
        assert!(matches!(sync.delete(&ghost), Err(ChatError::NotFound(_))));
        assert!(matches!(sync.open_edit(&ghost), Err(ChatError::NotFound(_))));
        assert!(matches!(sync.save_edit(), Err(ChatError::NoOverlay)));
    }

    #[tokio::test]
    async fn remote_delete_closes_an_overlay_on_that_message() {
        let store = MemoryStore::new();
        let id = store
            .create_record("messages", fields("a", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();

        let (mut sync, mut status) = controller(&store);
        sync.start().await.unwrap();
        sync.poll();
        sync.open_edit(&id).unwrap();

        store.delete_record("messages", &id).await.unwrap();
        sync.next_batch().await.unwrap();

        assert!(sync.overlay().is_none());
        assert!(sync.cache().is_empty());
        assert!(status.try_recv().unwrap().contains("deleted"));
    }

    #[tokio::test]
    async fn next_batch_requires_start() {
        let store = MemoryStore::new();
        let (mut sync, _status) = controller(&store);
        assert!(matches!(sync.next_batch().await, Err(ChatError::NotStarted)));
        assert_eq!(sync.poll(), 0);
    }

    fn message(id: &str, text: &str, second: u32) -> crate::chat::Message {
        crate::chat::Message {
            id: MessageId::new(id),
            username: "bob".to_string(),
            text: text.to_string(),
            date: format!("2024. 01. 01. 10:00:{second:02}"),
        }
    }

    async fn live_controller(store: &MemoryStore) -> SyncController {
        let (mut sync, _status) = controller(store);
        sync.start().await.unwrap();
        sync.poll();
        assert_eq!(sync.phase(), SyncPhase::Live);
        sync
    }

    #[tokio::test]
    async fn removed_for_unknown_id_is_skipped() {
        let store = MemoryStore::new();
        let mut sync = live_controller(&store).await;
        sync.apply_batch(ChangeBatch::new(vec![ChangeEvent::Added(message("a", "a", 1))]));

        sync.apply_batch(ChangeBatch::new(vec![
            ChangeEvent::Removed(message("ghost", "?", 2)),
            ChangeEvent::Added(message("b", "b", 3)),
        ]));

        let ids: Vec<&str> = sync.cache().messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn repeated_added_is_ignored_when_live() {
        let store = MemoryStore::new();
        let mut sync = live_controller(&store).await;

        sync.apply_batch(ChangeBatch::new(vec![ChangeEvent::Added(message("a", "first", 1))]));
        sync.apply_batch(ChangeBatch::new(vec![ChangeEvent::Added(message("a", "again", 1))]));

        assert_eq!(sync.cache().len(), 1);
        assert_eq!(sync.cache().get(&MessageId::new("a")).unwrap().text, "first");
    }

    #[tokio::test]
    async fn live_added_reveals_the_newest_row() {
        let store = MemoryStore::new();
        let mut sync = live_controller(&store).await;
        sync.apply_batch(ChangeBatch::new(vec![
            ChangeEvent::Added(message("a", "a", 1)),
            ChangeEvent::Added(message("b", "b", 2)),
            ChangeEvent::Added(message("c", "c", 3)),
        ]));
        assert_eq!(sync.view_parts().1.layout(3, 2), 1..3);

        // Scroll away from the bottom; a repeated add must not pull us back
        sync.view_parts().1.scroll_up(1);
        assert_eq!(sync.view_parts().1.layout(3, 2), 0..2);
        sync.apply_batch(ChangeBatch::new(vec![ChangeEvent::Added(message("c", "c", 3))]));
        assert_eq!(sync.view_parts().1.layout(3, 2), 0..2);

        sync.apply_batch(ChangeBatch::new(vec![ChangeEvent::Added(message("d", "d", 4))]));
        assert_eq!(sync.view_parts().1.layout(4, 2), 2..4);
    }

    #[tokio::test]
    async fn second_delete_waits_for_the_first() {
        let store = MemoryStore::new();
        let id = store
            .create_record("messages", fields("a", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();
        let mut sync = live_controller(&store).await;

        let first = sync.delete(&id).unwrap();
        assert!(sync.is_delete_pending(&id));
        assert!(matches!(sync.delete(&id), Err(ChatError::DeletePending(p)) if p == id));

        first.await.unwrap().unwrap();
        sync.next_batch().await.unwrap();
        assert!(!sync.is_delete_pending(&id));
        assert!(sync.cache().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_can_be_retried() {
        let store = MemoryStore::new();
        let mut sync = live_controller(&store).await;
        // On screen but unknown to the store
        sync.apply_batch(ChangeBatch::new(vec![ChangeEvent::Added(message("x", "x", 1))]));
        let id = MessageId::new("x");

        let result = sync.delete(&id).unwrap().await.unwrap();
        assert!(result.is_err());
        assert!(!sync.is_delete_pending(&id));
        assert!(sync.delete(&id).is_ok());
    }

    #[tokio::test]
    async fn blank_edit_is_refused_and_popup_stays() {
        let store = MemoryStore::new();
        let id = store
            .create_record("messages", fields("keep me", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();
        let mut sync = live_controller(&store).await;

        sync.open_edit(&id).unwrap().field = crate::input::TextField::with_value("   ");
        assert!(matches!(sync.save_edit(), Err(ChatError::EmptyMessage)));

        assert_eq!(sync.overlay().map(|o| o.target()), Some(&id));
        assert_eq!(sync.cache().get(&id).unwrap().text, "keep me");
    }
}
