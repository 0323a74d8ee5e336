use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryStore;

mod memory;

use crate::chat::{ChangeBatch, Message, MessageFields, MessageId, MessagePatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document '{id}' not found in collection '{collection}'")]
    NotFound { collection: String, id: MessageId },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store data is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Date,
}

/// An ordered view over one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: String,
    pub order_by: SortKey,
    pub ascending: bool,
}

impl Query {
    pub fn by_date(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: SortKey::Date,
            ascending: true,
        }
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    /// Sort `messages` the way this query orders them.
    pub fn sort(&self, messages: &mut [Message]) {
        match self.order_by {
            SortKey::Date => messages.sort_by(|a, b| a.date.cmp(&b.date)),
        }
        if !self.ascending {
            messages.reverse();
        }
    }
}

/// A running live query. Batches arrive in the order the store produced
/// them; the first one is the full snapshot of the query.
#[derive(Debug)]
pub struct LiveQuery {
    query: Query,
    rx: mpsc::UnboundedReceiver<ChangeBatch>,
}

impl LiveQuery {
    pub fn new(query: Query, rx: mpsc::UnboundedReceiver<ChangeBatch>) -> Self {
        Self { query, rx }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Wait for the next batch. `None` once the store side has gone away.
    pub async fn recv(&mut self) -> Option<ChangeBatch> {
        self.rx.recv().await
    }

    /// Next batch if one is already waiting.
    pub fn try_recv(&mut self) -> Option<ChangeBatch> {
        self.rx.try_recv().ok()
    }

    /// Stop the subscription. Batches already queued are discarded.
    pub fn cancel(mut self) {
        self.rx.close();
    }
}

/// A hosted document collection of chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_record(&self, collection: &str, fields: MessageFields)
        -> StoreResult<MessageId>;

    async fn list_records(&self, query: &Query) -> StoreResult<Vec<Message>>;

    async fn update_record(
        &self,
        collection: &str,
        id: &MessageId,
        patch: MessagePatch,
    ) -> StoreResult<()>;

    async fn delete_record(&self, collection: &str, id: &MessageId) -> StoreResult<()>;

    async fn subscribe_live_query(&self, query: &Query) -> StoreResult<LiveQuery>;
}
