//! Contract toward the remote document collection holding the playlist.

use crate::protocol::PlaylistItem;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("document store query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("malformed document {doc_id}: {reason}")]
    Malformed { doc_id: String, reason: String },
    #[error("document store unreachable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("document store write failed: {0}")]
    Write(#[from] rusqlite::Error),
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("document store unreachable: {0}")]
    Unavailable(String),
}

pub trait RemoteStore: Send {
    /// All documents ordered by `position` ascending.
    fn fetch_all(&mut self) -> Result<Vec<PlaylistItem>, FetchError>;

    /// Writes the whole document under `doc_id`, replacing any previous version.
    fn persist_one(&mut self, doc_id: &str, item: &PlaylistItem) -> Result<(), PersistError>;
}
