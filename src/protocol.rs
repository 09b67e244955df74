//! Event-bus protocol shared by all runtime components.
//!
//! This module defines the playlist document model and every message payload
//! exchanged between the player, the remote sync worker and the front end.

/// One document of the remote playlist collection.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaylistItem {
    /// Stable external document key.
    #[serde(default)]
    pub doc_id: String,
    /// Dense zero-based rank defining display and playback order.
    #[serde(default)]
    pub position: usize,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    /// Poster/thumbnail reference shown before playback starts.
    #[serde(default)]
    pub thumb: String,
    /// Playable source references; the first one is loaded.
    pub sources: Vec<String>,
    /// Excluded from auto-advance and manual selection while set.
    #[serde(default)]
    pub skip: bool,
}

impl PlaylistItem {
    pub fn primary_source(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }
}

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Playlist(PlaylistMessage),
    Playback(PlaybackMessage),
    Sync(SyncMessage),
    Notice(Notice),
    Shutdown,
}

/// Playlist-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaylistMessage {
    /// Full ordered collection delivered by the remote store.
    PlaylistFetched(Vec<PlaylistItem>),
    /// Remote fetch failed; the store keeps its previous snapshot.
    PlaylistUnavailable(String),
    /// User picked an item from the list view.
    SelectItem(String),
    /// Drag-reorder expressed in list indices.
    ReorderItems {
        from: usize,
        to: usize,
    },
    /// Drag-reorder expressed by document key and target index.
    MoveItem {
        doc_id: String,
        to: usize,
    },
    ToggleSkip(String),
    SetPlaylistHidden(bool),
}

/// Playback commands and media engine callbacks.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    /// Media engine learned the duration of the source it was asked to load.
    MetadataReady {
        doc_id: String,
        duration_secs: f64,
    },
    TimeUpdate {
        doc_id: String,
        position_secs: f64,
    },
    /// Natural end of media.
    Ended {
        doc_id: String,
    },
    PlaybackFailed {
        doc_id: String,
        reason: String,
    },
    Play,
    Pause,
    TogglePlay,
    Seek(f64),
    /// Relative jump in seconds (negative seeks backwards).
    SeekRelative(f64),
    /// Debounce timer for the seek tagged with `generation` expired.
    SeekTimerElapsed {
        generation: u64,
    },
    SetSpeed(f32),
    SetVolume(u8),
}

/// Remote persistence commands and results.
#[derive(Debug, Clone)]
pub enum SyncMessage {
    FetchPlaylist,
    PersistItem(PlaylistItem),
    PersistFailed {
        doc_id: String,
        reason: String,
    },
}

/// User-visible, non-fatal warnings.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PlaylistUnavailable,
    SkipRejectedForCurrentItem { title: String },
    ItemNotSelectable { title: String },
    PlaybackBlocked { reason: String },
    InvalidCommand(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::PlaylistUnavailable => {
                write!(f, "Playlist unavailable. Reload to try again.")
            }
            Notice::SkipRejectedForCurrentItem { title } => {
                write!(f, "\"{}\" is playing and cannot be skipped", title)
            }
            Notice::ItemNotSelectable { title } => {
                write!(f, "\"{}\" is marked as skipped", title)
            }
            Notice::PlaybackBlocked { reason } => {
                write!(f, "Playback did not start: {}", reason)
            }
            Notice::InvalidCommand(reason) => write!(f, "{}", reason),
        }
    }
}
