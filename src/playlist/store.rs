//! Single authoritative playlist container.
//!
//! Every mutation builds a fresh immutable [`PlaylistSnapshot`] and publishes
//! it to subscribers; partial in-place updates are never exposed.

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::watch;

use crate::{playlist::normalize_positions, protocol::PlaylistItem};

/// Immutable view of the playlist consumed by the player, list and info panel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaylistSnapshot {
    /// Incremented on every published mutation.
    pub version: u64,
    /// Items ordered by position; positions are dense.
    pub items: Vec<PlaylistItem>,
    /// Document key of the item loaded into the media engine.
    pub current_doc_id: Option<String>,
    /// Hidden while the player is fullscreen.
    pub playlist_hidden: bool,
}

impl PlaylistSnapshot {
    pub fn current_item(&self) -> Option<&PlaylistItem> {
        let doc_id = self.current_doc_id.as_deref()?;
        self.find(doc_id)
    }

    pub fn find(&self, doc_id: &str) -> Option<&PlaylistItem> {
        self.items.iter().find(|item| item.doc_id == doc_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct PlaylistStore {
    snapshot: Arc<PlaylistSnapshot>,
    publisher: watch::Sender<Arc<PlaylistSnapshot>>,
}

impl PlaylistStore {
    pub fn new() -> Self {
        let snapshot = Arc::new(PlaylistSnapshot::default());
        let (publisher, _) = watch::channel(snapshot.clone());
        Self {
            snapshot,
            publisher,
        }
    }

    pub fn snapshot(&self) -> Arc<PlaylistSnapshot> {
        self.snapshot.clone()
    }

    /// Receiver that always observes the latest published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<PlaylistSnapshot>> {
        self.publisher.subscribe()
    }

    /// Replaces the whole collection. The current pointer survives when its
    /// document is still present.
    pub fn replace_playlist(&mut self, items: Vec<PlaylistItem>) {
        let items = normalize_positions(items);
        let current_doc_id = self
            .snapshot
            .current_doc_id
            .clone()
            .filter(|doc_id| items.iter().any(|item| &item.doc_id == doc_id));
        if current_doc_id.is_none() && self.snapshot.current_doc_id.is_some() {
            debug!("PlaylistStore: current item no longer in playlist, clearing pointer");
        }
        self.publish(PlaylistSnapshot {
            version: self.snapshot.version + 1,
            items,
            current_doc_id,
            playlist_hidden: self.snapshot.playlist_hidden,
        });
    }

    /// Points the current pointer at `doc_id`; unknown keys are rejected.
    pub fn set_current_item(&mut self, doc_id: Option<&str>) -> bool {
        if let Some(doc_id) = doc_id {
            if self.snapshot.find(doc_id).is_none() {
                warn!("PlaylistStore: cannot select unknown item {}", doc_id);
                return false;
            }
        }
        if self.snapshot.current_doc_id.as_deref() == doc_id {
            return true;
        }
        let mut next = (*self.snapshot).clone();
        next.version += 1;
        next.current_doc_id = doc_id.map(str::to_string);
        self.publish(next);
        true
    }

    /// Replaces one document by key, republishing the entire list.
    pub fn replace_item(&mut self, updated: PlaylistItem) -> bool {
        if self.snapshot.find(&updated.doc_id).is_none() {
            return false;
        }
        let items = self
            .snapshot
            .items
            .iter()
            .map(|item| {
                if item.doc_id == updated.doc_id {
                    updated.clone()
                } else {
                    item.clone()
                }
            })
            .collect();
        self.replace_playlist(items);
        true
    }

    pub fn set_playlist_hidden(&mut self, hidden: bool) {
        if self.snapshot.playlist_hidden == hidden {
            return;
        }
        let mut next = (*self.snapshot).clone();
        next.version += 1;
        next.playlist_hidden = hidden;
        self.publish(next);
    }

    fn publish(&mut self, snapshot: PlaylistSnapshot) {
        let snapshot = Arc::new(snapshot);
        self.snapshot = snapshot.clone();
        self.publisher.send_replace(snapshot);
    }
}

impl Default for PlaylistStore {
    fn default() -> Self {
        Self::new()
    }
}
