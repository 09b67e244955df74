//! Bus worker that talks to the remote document collection.
//!
//! Persist requests are fire-and-forget for the sender: the local snapshot is
//! already updated, a failure is logged and reported but never retried.

use log::{debug, error, info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};

use crate::{
    protocol::{Message, PlaylistMessage, SyncMessage},
    remote::RemoteStore,
};

pub struct SyncManager {
    remote: Box<dyn RemoteStore>,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
}

impl SyncManager {
    pub fn new(
        remote: Box<dyn RemoteStore>,
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
    ) -> Self {
        Self {
            remote,
            bus_consumer,
            bus_producer,
        }
    }

    fn fetch_playlist(&mut self) {
        match self.remote.fetch_all() {
            Ok(items) => {
                info!("Fetched {} playlist items", items.len());
                let _ = self.bus_producer.send(Message::Playlist(
                    PlaylistMessage::PlaylistFetched(items),
                ));
            }
            Err(err) => {
                error!("Playlist fetch failed: {}", err);
                let _ = self.bus_producer.send(Message::Playlist(
                    PlaylistMessage::PlaylistUnavailable(err.to_string()),
                ));
            }
        }
    }

    fn persist_item(&mut self, item: &crate::protocol::PlaylistItem) {
        match self.remote.persist_one(&item.doc_id, item) {
            Ok(()) => debug!(
                "Persisted {} at position {} (skip={})",
                item.doc_id, item.position, item.skip
            ),
            Err(err) => {
                error!("Failed to persist {}: {}", item.doc_id, err);
                let _ = self
                    .bus_producer
                    .send(Message::Sync(SyncMessage::PersistFailed {
                        doc_id: item.doc_id.clone(),
                        reason: err.to_string(),
                    }));
            }
        }
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Sync(SyncMessage::FetchPlaylist)) => self.fetch_playlist(),
                Ok(Message::Sync(SyncMessage::PersistItem(item))) => self.persist_item(&item),
                Ok(Message::Shutdown) => {
                    debug!("SyncManager: shutting down");
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SyncManager: bus lagged, {} messages dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
