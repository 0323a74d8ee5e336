use thiserror::Error;

pub use cache::MessageCache;
pub use compose::{Draft, DEFAULT_DATE_FORMAT};
pub use message::{ChangeBatch, ChangeEvent, Message, MessageFields, MessageId, MessagePatch};
pub use overlay::EditOverlay;
pub use sync::{RemoteCall, SyncController, SyncPhase};
pub use view::ListViewport;

mod cache;
mod compose;
mod message;
mod overlay;
mod sync;
mod view;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message {0} not found")]
    NotFound(MessageId),
    #[error("an edit is already open for message {0}")]
    OverlayBusy(MessageId),
    #[error("message {0} is already being deleted")]
    DeletePending(MessageId),
    #[error("no edit is open")]
    NoOverlay,
    #[error("message text is empty")]
    EmptyMessage,
    #[error("live query not started")]
    NotStarted,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ChatResult<T> = Result<T, ChatError>;
