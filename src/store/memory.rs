use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use super::{LiveQuery, MessageStore, Query, StoreError, StoreResult};
use crate::chat::{ChangeBatch, ChangeEvent, Message, MessageFields, MessageId, MessagePatch};

type Collection = BTreeMap<MessageId, MessageFields>;

struct Subscriber {
    query: Query,
    tx: mpsc::UnboundedSender<ChangeBatch>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, Collection>,
    subscribers: Vec<Subscriber>,
}

impl Inner {
    fn snapshot(&self, query: &Query) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Message::from_fields(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default();
        query.sort(&mut messages);
        messages
    }

    /// Deliver one change to every live query on `collection`, dropping
    /// subscribers whose receiver is gone.
    fn publish(&mut self, collection: &str, event: ChangeEvent) {
        self.subscribers.retain(|sub| {
            if sub.query.collection != collection {
                return !sub.tx.is_closed();
            }
            sub.tx.send(ChangeBatch::new(vec![event.clone()])).is_ok()
        });
    }
}

/// In-process document store with live queries, optionally persisted to a
/// JSON file after every mutation.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load collections from `path` if it exists and write back to it on
    /// every change.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let collections = match fs::read_to_string(&path).await {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!("opened message store at {}", path.display());

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                collections,
                subscribers: Vec::new(),
            })),
            persist_path: Some(path),
        })
    }

    pub async fn len(&self, collection: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.collections.get(collection).map_or(0, |docs| docs.len())
    }

    pub async fn get(&self, collection: &str, id: &MessageId) -> Option<Message> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Message::from_fields(id.clone(), fields.clone()))
    }

    /// Write `staged` out and only then make it the live state, so a
    /// failed write leaves nothing changed.
    async fn commit(
        &self,
        inner: &mut Inner,
        staged: HashMap<String, Collection>,
    ) -> StoreResult<()> {
        if let Some(path) = &self.persist_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let json = serde_json::to_string_pretty(&staged)?;
            fs::write(path, json).await?;
        }
        inner.collections = staged;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_record(
        &self,
        collection: &str,
        fields: MessageFields,
    ) -> StoreResult<MessageId> {
        let id = MessageId::new(Uuid::new_v4().simple().to_string());
        let mut inner = self.inner.lock().await;
        let mut staged = inner.collections.clone();
        staged
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields.clone());
        self.commit(&mut inner, staged).await?;

        debug!("created {collection}/{id}");
        inner.publish(collection, ChangeEvent::Added(Message::from_fields(id.clone(), fields)));
        Ok(id)
    }

    async fn list_records(&self, query: &Query) -> StoreResult<Vec<Message>> {
        let inner = self.inner.lock().await;
        Ok(inner.snapshot(query))
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &MessageId,
        patch: MessagePatch,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let mut staged = inner.collections.clone();
        let fields = staged
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;
        patch.apply(fields);
        let updated = Message::from_fields(id.clone(), fields.clone());
        self.commit(&mut inner, staged).await?;

        debug!("updated {collection}/{id}");
        inner.publish(collection, ChangeEvent::Modified(updated));
        Ok(())
    }

    async fn delete_record(&self, collection: &str, id: &MessageId) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let mut staged = inner.collections.clone();
        let fields = staged
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;
        self.commit(&mut inner, staged).await?;

        debug!("deleted {collection}/{id}");
        inner.publish(collection, ChangeEvent::Removed(Message::from_fields(id.clone(), fields)));
        Ok(())
    }

    async fn subscribe_live_query(&self, query: &Query) -> StoreResult<LiveQuery> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;

        let snapshot = inner
            .snapshot(query)
            .into_iter()
            .map(ChangeEvent::Added)
            .collect();
        // Receiver is alive, so the first send cannot fail
        let _ = tx.send(ChangeBatch::new(snapshot));

        inner.subscribers.push(Subscriber {
            query: query.clone(),
            tx,
        });
        debug!("live query opened on {}", query.collection);
        Ok(LiveQuery::new(query.clone(), rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(text: &str, date: &str) -> MessageFields {
        MessageFields {
            username: "alice".to_string(),
            text: text.to_string(),
            date: date.to_string(),
        }
    }

    #[tokio::test]
    async fn list_is_ordered_by_date() {
        let store = MemoryStore::new();
        store
            .create_record("messages", fields("second", "2024. 01. 01. 10:00:02"))
            .await
            .unwrap();
        store
            .create_record("messages", fields("first", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();
        store
            .create_record("other", fields("elsewhere", "2024. 01. 01. 09:00:00"))
            .await
            .unwrap();

        let query = Query::by_date("messages");
        let texts: Vec<String> = store
            .list_records(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["first", "second"]);

        let texts: Vec<String> = store
            .list_records(&query.descending())
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, ["second", "first"]);
    }

    #[tokio::test]
    async fn live_query_starts_with_snapshot_then_streams_changes() {
        let store = MemoryStore::new();
        let id = store
            .create_record("messages", fields("hi", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();

        let mut live = store
            .subscribe_live_query(&Query::by_date("messages"))
            .await
            .unwrap();
        let first = live.recv().await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(matches!(&first.changes[0], ChangeEvent::Added(m) if m.id == id));

        store
            .update_record("messages", &id, MessagePatch::text("hello"))
            .await
            .unwrap();
        store.delete_record("messages", &id).await.unwrap();
        store
            .create_record("other", fields("ignored", "2024. 01. 01. 10:00:05"))
            .await
            .unwrap();

        let modified = live.recv().await.unwrap();
        assert!(matches!(&modified.changes[0], ChangeEvent::Modified(m) if m.text == "hello"));
        let removed = live.recv().await.unwrap();
        assert!(matches!(&removed.changes[0], ChangeEvent::Removed(m) if m.id == id));
        assert!(live.try_recv().is_none());
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let store = MemoryStore::new();
        let id = MessageId::new("nope");
        assert!(matches!(
            store.delete_record("messages", &id).await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store
                .update_record("messages", &id, MessagePatch::text("x"))
                .await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn persisted_collections_survive_reopen() {
        let path = std::env::temp_dir()
            .join(format!("livechat-store-{}", Uuid::new_v4().simple()))
            .join("messages.json");

        let store = MemoryStore::open(&path).await.unwrap();
        let id = store
            .create_record("messages", fields("kept", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        let message = reopened.get("messages", &id).await.unwrap();
        assert_eq!(message.text, "kept");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn cancelled_queries_are_dropped() {
        let store = MemoryStore::new();
        let live = store
            .subscribe_live_query(&Query::by_date("messages"))
            .await
            .unwrap();
        live.cancel();
        store
            .create_record("messages", fields("hi", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();
        assert!(store.inner.lock().await.subscribers.is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_change_behind() {
        let dir = std::env::temp_dir().join(format!("livechat-store-{}", Uuid::new_v4().simple()));
        let path = dir.join("messages.json");

        let store = MemoryStore::open(&path).await.unwrap();
        let kept = store
            .create_record("messages", fields("kept", "2024. 01. 01. 10:00:01"))
            .await
            .unwrap();
        let mut live = store
            .subscribe_live_query(&Query::by_date("messages"))
            .await
            .unwrap();
        live.recv().await.unwrap();

        // A directory where the file should be makes every write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let created = store
            .create_record("messages", fields("lost", "2024. 01. 01. 10:00:02"))
            .await;
        assert!(matches!(created, Err(StoreError::Io(_))));
        assert!(store
            .update_record("messages", &kept, MessagePatch::text("changed"))
            .await
            .is_err());
        assert!(store.delete_record("messages", &kept).await.is_err());

        assert_eq!(store.len("messages").await, 1);
        assert_eq!(store.get("messages", &kept).await.unwrap().text, "kept");
        assert!(live.try_recv().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
