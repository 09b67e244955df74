//! Owns the playlist store and the playback session, and applies bus messages
//! to them one at a time.

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::{
    runtime::Handle,
    sync::{
        broadcast::{error::RecvError, Receiver, Sender},
        watch,
    },
};

use crate::{
    config::PlaybackConfig,
    playback::{
        debounce::Debouncer,
        media::MediaOutput,
        session::{
            PlaybackSession, PlaybackStatus, ReadyOutcome, SelectionTrigger, SessionError,
        },
    },
    playlist::{
        ordering::{self, ReorderOutcome},
        store::{PlaylistSnapshot, PlaylistStore},
    },
    protocol::{Message, Notice, PlaybackMessage, PlaylistItem, PlaylistMessage, SyncMessage},
    session_storage::SessionStorage,
};

pub struct PlayerManager {
    store: PlaylistStore,
    session: PlaybackSession,
    media: Box<dyn MediaOutput>,
    seek_debouncer: Debouncer,
    status_publisher: watch::Sender<PlaybackStatus>,
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
}

impl PlayerManager {
    pub fn new(
        config: &PlaybackConfig,
        storage: SessionStorage,
        media: Box<dyn MediaOutput>,
        timer_handle: Handle,
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
    ) -> Self {
        let session = PlaybackSession::new(config.session_settings(), storage);
        let (status_publisher, _) = watch::channel(session.status());
        Self {
            store: PlaylistStore::new(),
            session,
            media,
            seek_debouncer: Debouncer::new(
                Duration::from_millis(config.seek_debounce_ms),
                timer_handle,
            ),
            status_publisher,
            bus_consumer,
            bus_producer,
        }
    }

    pub fn subscribe_playlist(&self) -> watch::Receiver<Arc<PlaylistSnapshot>> {
        self.store.subscribe()
    }

    /// Receiver for the now-playing view; updated after every handled message.
    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status_publisher.subscribe()
    }

    pub fn snapshot(&self) -> Arc<PlaylistSnapshot> {
        self.store.snapshot()
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    fn publish_status(&self) {
        let next = self.session.status();
        self.status_publisher.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn notify(&self, notice: Notice) {
        warn!("{}", notice);
        let _ = self.bus_producer.send(Message::Notice(notice));
    }

    fn request_persist(&self, item: PlaylistItem) {
        let _ = self
            .bus_producer
            .send(Message::Sync(SyncMessage::PersistItem(item)));
    }

    fn on_playlist_fetched(&mut self, items: Vec<PlaylistItem>) {
        self.store.replace_playlist(items);
        let snapshot = self.store.snapshot();
        if snapshot.is_empty() {
            warn!("Fetched playlist is empty");
            return;
        }
        if let Some(current) = snapshot.current_item() {
            self.session.note_current_position(current.position);
            return;
        }

        let index = self.session.restore_index(snapshot.len());
        let item = &snapshot.items[index];
        match self
            .session
            .select_item(item, SelectionTrigger::Restore, self.media.as_mut())
        {
            Ok(()) => {
                self.store.set_current_item(Some(&item.doc_id));
            }
            Err(err) => warn!("Could not restore item at index {}: {}", index, err),
        }
    }

    fn select_item(&mut self, doc_id: &str) {
        let snapshot = self.store.snapshot();
        let Some(item) = snapshot.find(doc_id) else {
            warn!("Select ignored, unknown item {}", doc_id);
            return;
        };
        match self
            .session
            .select_item(item, SelectionTrigger::User, self.media.as_mut())
        {
            Ok(()) => {
                self.seek_debouncer.cancel();
                self.store.set_current_item(Some(doc_id));
            }
            Err(SessionError::ItemSkipped(_)) => self.notify(Notice::ItemNotSelectable {
                title: item.title.clone(),
            }),
            Err(err) => self.notify(Notice::PlaybackBlocked {
                reason: err.to_string(),
            }),
        }
    }

    fn apply_reorder(&mut self, outcome: Option<ReorderOutcome>) {
        let Some(outcome) = outcome else {
            debug!("Reorder is a no-op");
            return;
        };
        info!("Reordered playlist, {} items moved", outcome.changed.len());
        self.store.replace_playlist(outcome.items);
        if let Some(position) = outcome.current_moved_to {
            self.session.note_current_position(position);
        }
        for item in outcome.changed {
            self.request_persist(item);
        }
    }

    fn current_position(snapshot: &PlaylistSnapshot) -> Option<usize> {
        snapshot.current_item().map(|item| item.position)
    }

    fn reorder_items(&mut self, from: usize, to: usize) {
        let snapshot = self.store.snapshot();
        let outcome = ordering::reorder(
            &snapshot.items,
            from,
            to,
            Self::current_position(&snapshot),
        );
        self.apply_reorder(outcome);
    }

    fn move_item(&mut self, doc_id: &str, to: usize) {
        let snapshot = self.store.snapshot();
        let outcome = ordering::reorder_by_id(
            &snapshot.items,
            doc_id,
            to,
            Self::current_position(&snapshot),
        );
        self.apply_reorder(outcome);
    }

    fn toggle_skip(&mut self, doc_id: &str) {
        let snapshot = self.store.snapshot();
        let Some(item) = snapshot.find(doc_id) else {
            warn!("Skip toggle ignored, unknown item {}", doc_id);
            return;
        };
        match self.session.toggle_skip(item) {
            Ok(updated) => {
                debug!("Item {} skip={}", updated.doc_id, updated.skip);
                self.store.replace_item(updated.clone());
                self.request_persist(updated);
            }
            Err(_) => self.notify(Notice::SkipRejectedForCurrentItem {
                title: item.title.clone(),
            }),
        }
    }

    fn schedule_seek(&mut self, generation: Option<u64>) {
        let Some(generation) = generation else {
            debug!("Seek ignored, media not ready");
            return;
        };
        let bus_producer = self.bus_producer.clone();
        self.seek_debouncer.schedule(move || {
            let _ = bus_producer.send(Message::Playback(PlaybackMessage::SeekTimerElapsed {
                generation,
            }));
        });
    }

    fn on_ended(&mut self, doc_id: &str) {
        let snapshot = self.store.snapshot();
        if let Some(next) = self
            .session
            .on_ended(doc_id, &snapshot.items, self.media.as_mut())
        {
            self.store.set_current_item(Some(&next));
        }
    }

    fn handle_playlist_message(&mut self, message: PlaylistMessage) {
        match message {
            PlaylistMessage::PlaylistFetched(items) => self.on_playlist_fetched(items),
            PlaylistMessage::PlaylistUnavailable(reason) => {
                debug!("Keeping previous playlist snapshot: {}", reason);
                self.notify(Notice::PlaylistUnavailable);
            }
            PlaylistMessage::SelectItem(doc_id) => self.select_item(&doc_id),
            PlaylistMessage::ReorderItems { from, to } => self.reorder_items(from, to),
            PlaylistMessage::MoveItem { doc_id, to } => self.move_item(&doc_id, to),
            PlaylistMessage::ToggleSkip(doc_id) => self.toggle_skip(&doc_id),
            PlaylistMessage::SetPlaylistHidden(hidden) => self.store.set_playlist_hidden(hidden),
        }
    }

    fn handle_playback_message(&mut self, message: PlaybackMessage) {
        match message {
            PlaybackMessage::MetadataReady {
                doc_id,
                duration_secs,
            } => {
                if let ReadyOutcome::AutoplayBlocked(err) =
                    self.session.on_metadata_ready(&doc_id, duration_secs, self.media.as_mut())
                {
                    self.notify(Notice::PlaybackBlocked {
                        reason: err.to_string(),
                    });
                }
            }
            PlaybackMessage::TimeUpdate {
                doc_id,
                position_secs,
            } => self.session.on_time_update(&doc_id, position_secs),
            PlaybackMessage::Ended { doc_id } => self.on_ended(&doc_id),
            PlaybackMessage::PlaybackFailed { doc_id, reason } => {
                self.session.on_playback_failed(&doc_id, &reason);
            }
            PlaybackMessage::Play => {
                if let Err(err) = self.session.play(self.media.as_mut()) {
                    self.notify(Notice::PlaybackBlocked {
                        reason: err.to_string(),
                    });
                }
            }
            PlaybackMessage::Pause => self.session.pause(self.media.as_mut()),
            PlaybackMessage::TogglePlay => {
                if let Err(err) = self.session.toggle_play(self.media.as_mut()) {
                    self.notify(Notice::PlaybackBlocked {
                        reason: err.to_string(),
                    });
                }
            }
            PlaybackMessage::Seek(target_secs) => {
                let generation = self.session.seek(target_secs);
                self.schedule_seek(generation);
            }
            PlaybackMessage::SeekRelative(delta_secs) => {
                let generation = self.session.seek_relative(delta_secs);
                self.schedule_seek(generation);
            }
            PlaybackMessage::SeekTimerElapsed { generation } => {
                self.session.apply_pending_seek(generation, self.media.as_mut());
            }
            PlaybackMessage::SetSpeed(rate) => {
                if let Err(err) = self.session.set_speed(rate, self.media.as_mut()) {
                    self.notify(Notice::InvalidCommand(err.to_string()));
                }
            }
            PlaybackMessage::SetVolume(level) => self.session.set_volume(level, self.media.as_mut()),
        }
    }

    /// Applies one message; returns false once the manager should stop.
    pub fn handle_message(&mut self, message: Message) -> bool {
        match message {
            Message::Playlist(message) => {
                self.handle_playlist_message(message);
                self.publish_status();
            }
            Message::Playback(message) => {
                self.handle_playback_message(message);
                self.publish_status();
            }
            Message::Shutdown => return false,
            Message::Sync(_) | Message::Notice(_) => {}
        }
        true
    }

    pub fn run(&mut self) {
        let _ = self
            .bus_producer
            .send(Message::Sync(SyncMessage::FetchPlaylist));
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => {
                    if !self.handle_message(message) {
                        debug!("PlayerManager: shutting down");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("PlayerManager: bus lagged, {} messages dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast::{self, error::TryRecvError, Receiver};

    use super::PlayerManager;
    use crate::{
        config::PlaybackConfig,
        playback::{
            media::recording::{MediaCommand, RecordingMediaOutput},
            session::{PlaybackState, VolumeLevel},
        },
        playlist::test_items,
        protocol::{Message, Notice, PlaybackMessage, PlaylistMessage, SyncMessage},
        session_storage::SessionStorage,
    };

    struct PlayerManagerHarness {
        manager: PlayerManager,
        media: RecordingMediaOutput,
        receiver: Receiver<Message>,
        runtime: tokio::runtime::Runtime,
    }

    impl PlayerManagerHarness {
        fn new(keys: &[&str]) -> Self {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .expect("timer runtime");
            let (bus_sender, _) = broadcast::channel(1024);
            let media = RecordingMediaOutput::default();
            let manager = PlayerManager::new(
                &PlaybackConfig::default(),
                SessionStorage::in_memory(),
                Box::new(media.clone()),
                runtime.handle().clone(),
                bus_sender.subscribe(),
                bus_sender.clone(),
            );
            let receiver = bus_sender.subscribe();
            let mut harness = Self {
                manager,
                media,
                receiver,
                runtime,
            };
            harness.send(Message::Playlist(PlaylistMessage::PlaylistFetched(
                test_items(keys),
            )));
            harness.drain_messages();
            harness.media.take();
            harness
        }

        fn send(&mut self, message: Message) {
            assert!(self.manager.handle_message(message));
        }

        fn drain_messages(&mut self) -> Vec<Message> {
            let mut messages = Vec::new();
            loop {
                match self.receiver.try_recv() {
                    Ok(message) => messages.push(message),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            messages
        }

        fn persisted(&mut self) -> Vec<(String, usize, bool)> {
            self.drain_messages()
                .into_iter()
                .filter_map(|message| match message {
                    Message::Sync(SyncMessage::PersistItem(item)) => {
                        Some((item.doc_id, item.position, item.skip))
                    }
                    _ => None,
                })
                .collect()
        }

        fn notices(&mut self) -> Vec<Notice> {
            self.drain_messages()
                .into_iter()
                .filter_map(|message| match message {
                    Message::Notice(notice) => Some(notice),
                    _ => None,
                })
                .collect()
        }

        fn play(&mut self, doc_id: &str) {
            self.send(Message::Playlist(PlaylistMessage::SelectItem(
                doc_id.to_string(),
            )));
            self.send(Message::Playback(PlaybackMessage::MetadataReady {
                doc_id: doc_id.to_string(),
                duration_secs: 120.0,
            }));
            self.drain_messages();
            self.media.take();
        }

        fn order(&self) -> Vec<String> {
            self.manager
                .snapshot()
                .items
                .iter()
                .map(|item| item.doc_id.clone())
                .collect()
        }
    }

    #[test]
    fn test_fetch_restores_first_item_without_autoplay() {
        let harness = PlayerManagerHarness::new(&["a", "b"]);
        let snapshot = harness.manager.snapshot();
        assert_eq!(snapshot.current_doc_id.as_deref(), Some("a"));
        assert_eq!(harness.manager.session().state(), PlaybackState::Loading);
        assert!(!harness.manager.session().autoplay_requested());
        assert_eq!(harness.manager.session().storage().current_index(), Some(0));
    }

    #[test]
    fn test_reorder_moves_item_and_persists_only_changed() {
        let mut harness = PlayerManagerHarness::new(&["a", "b", "c", "d"]);
        harness.play("c");

        harness.send(Message::Playlist(PlaylistMessage::ReorderItems {
            from: 1,
            to: 3,
        }));

        assert_eq!(harness.order(), vec!["a", "c", "d", "b"]);
        assert_eq!(
            harness.persisted(),
            vec![
                ("c".to_string(), 1, false),
                ("d".to_string(), 2, false),
                ("b".to_string(), 3, false),
            ]
        );
        let snapshot = harness.manager.snapshot();
        let current = snapshot.current_item().expect("current item");
        assert_eq!(current.doc_id, "c");
        assert_eq!(current.position, 1);
        assert_eq!(harness.manager.session().storage().current_index(), Some(1));
    }

    #[test]
    fn test_noop_reorders_persist_nothing() {
        let mut harness = PlayerManagerHarness::new(&["a", "b", "c"]);
        let version = harness.manager.snapshot().version;

        harness.send(Message::Playlist(PlaylistMessage::ReorderItems {
            from: 2,
            to: 2,
        }));
        harness.send(Message::Playlist(PlaylistMessage::ReorderItems {
            from: 0,
            to: 9,
        }));
        harness.send(Message::Playlist(PlaylistMessage::MoveItem {
            doc_id: "missing".to_string(),
            to: 0,
        }));

        assert!(harness.persisted().is_empty());
        assert_eq!(harness.manager.snapshot().version, version);
    }

    #[test]
    fn test_move_item_by_key() {
        let mut harness = PlayerManagerHarness::new(&["a", "b", "c"]);
        harness.send(Message::Playlist(PlaylistMessage::MoveItem {
            doc_id: "c".to_string(),
            to: 0,
        }));
        assert_eq!(harness.order(), vec!["c", "a", "b"]);
        assert_eq!(harness.persisted().len(), 3);
    }

    #[test]
    fn test_toggle_skip_on_current_item_warns() {
        let mut harness = PlayerManagerHarness::new(&["a", "b"]);
        harness.play("a");

        harness.send(Message::Playlist(PlaylistMessage::ToggleSkip(
            "a".to_string(),
        )));

        assert_eq!(
            harness.notices(),
            vec![Notice::SkipRejectedForCurrentItem {
                title: "Video a".to_string()
            }]
        );
        assert!(!harness.manager.snapshot().items[0].skip);
    }

    #[test]
    fn test_toggle_skip_persists_single_item() {
        let mut harness = PlayerManagerHarness::new(&["a", "b", "c"]);
        harness.send(Message::Playlist(PlaylistMessage::ToggleSkip(
            "b".to_string(),
        )));

        assert!(harness.manager.snapshot().items[1].skip);
        assert_eq!(harness.persisted(), vec![("b".to_string(), 1, true)]);
    }

    #[test]
    fn test_selecting_skipped_item_warns() {
        let mut harness = PlayerManagerHarness::new(&["a", "b"]);
        harness.send(Message::Playlist(PlaylistMessage::ToggleSkip(
            "b".to_string(),
        )));
        harness.drain_messages();

        harness.send(Message::Playlist(PlaylistMessage::SelectItem(
            "b".to_string(),
        )));

        assert_eq!(
            harness.notices(),
            vec![Notice::ItemNotSelectable {
                title: "Video b".to_string()
            }]
        );
        assert_eq!(
            harness.manager.snapshot().current_doc_id.as_deref(),
            Some("a")
        );
    }

    #[test]
    fn test_rejected_selection_keeps_pending_seek_alive() {
        let mut harness = PlayerManagerHarness::new(&["a", "b"]);
        harness.send(Message::Playlist(PlaylistMessage::ToggleSkip(
            "b".to_string(),
        )));
        harness.play("a");

        harness.send(Message::Playback(PlaybackMessage::Seek(30.0)));
        harness.send(Message::Playlist(PlaylistMessage::SelectItem(
            "b".to_string(),
        )));
        harness
            .runtime
            .block_on(async { tokio::time::sleep(Duration::from_millis(500)).await });
        for message in harness.drain_messages() {
            if matches!(
                message,
                Message::Playback(PlaybackMessage::SeekTimerElapsed { .. })
            ) {
                harness.send(message);
            }
        }

        assert_eq!(harness.manager.session().active_doc_id(), Some("a"));
        assert_eq!(harness.media.take(), vec![MediaCommand::SeekTo(30.0)]);
        assert!(!harness.manager.session().is_buffering());

        harness.send(Message::Playback(PlaybackMessage::TimeUpdate {
            doc_id: "a".to_string(),
            position_secs: 60.0,
        }));
        assert_eq!(harness.manager.session().position_secs(), 60.0);
    }

    #[test]
    fn test_natural_end_advances_past_skipped_items() {
        let mut harness = PlayerManagerHarness::new(&["a", "b", "c"]);
        harness.send(Message::Playlist(PlaylistMessage::ToggleSkip(
            "b".to_string(),
        )));
        harness.play("a");

        harness.send(Message::Playback(PlaybackMessage::Ended {
            doc_id: "a".to_string(),
        }));

        assert_eq!(
            harness.manager.snapshot().current_doc_id.as_deref(),
            Some("c")
        );
        assert_eq!(
            harness.media.take(),
            vec![MediaCommand::Load {
                doc_id: "c".to_string(),
                source: "https://cdn.example/c.mp4".to_string(),
            }]
        );
    }

    #[test]
    fn test_end_of_last_item_goes_idle() {
        let mut harness = PlayerManagerHarness::new(&["a", "b"]);
        harness.play("b");
        harness.send(Message::Playback(PlaybackMessage::Ended {
            doc_id: "b".to_string(),
        }));
        assert_eq!(harness.manager.session().state(), PlaybackState::Idle);
        assert_eq!(
            harness.manager.snapshot().current_doc_id.as_deref(),
            Some("b")
        );
    }

    #[test]
    fn test_seek_burst_reaches_media_once() {
        let mut harness = PlayerManagerHarness::new(&["a"]);
        harness.play("a");

        for target in [5.0, 15.0, 25.0, 35.0, 42.0] {
            harness.send(Message::Playback(PlaybackMessage::Seek(target)));
        }
        assert_eq!(harness.manager.session().position_secs(), 42.0);

        harness
            .runtime
            .block_on(async { tokio::time::sleep(Duration::from_millis(500)).await });
        let elapsed: Vec<Message> = harness
            .drain_messages()
            .into_iter()
            .filter(|message| {
                matches!(
                    message,
                    Message::Playback(PlaybackMessage::SeekTimerElapsed { .. })
                )
            })
            .collect();
        assert_eq!(elapsed.len(), 1);
        for message in elapsed {
            harness.send(message);
        }

        assert_eq!(harness.media.take(), vec![MediaCommand::SeekTo(42.0)]);
    }

    #[test]
    fn test_fetch_failure_keeps_previous_snapshot() {
        let mut harness = PlayerManagerHarness::new(&["a", "b"]);
        let before = harness.manager.snapshot();

        harness.send(Message::Playlist(PlaylistMessage::PlaylistUnavailable(
            "offline".to_string(),
        )));

        assert_eq!(harness.notices(), vec![Notice::PlaylistUnavailable]);
        assert_eq!(harness.manager.snapshot(), before);
    }

    #[test]
    fn test_refetch_keeps_current_item_and_tracks_its_new_index() {
        let mut harness = PlayerManagerHarness::new(&["a", "b", "c"]);
        harness.play("a");
        harness.send(Message::Playlist(PlaylistMessage::PlaylistFetched(
            test_items(&["b", "c", "a"]),
        )));

        let snapshot = harness.manager.snapshot();
        assert_eq!(snapshot.current_doc_id.as_deref(), Some("a"));
        assert_eq!(snapshot.current_item().map(|item| item.position), Some(2));
        assert_eq!(harness.manager.session().storage().current_index(), Some(2));
        assert_eq!(harness.manager.session().state(), PlaybackState::Playing);
    }

    #[test]
    fn test_status_follows_playback() {
        let mut harness = PlayerManagerHarness::new(&["a"]);
        let status = harness.manager.subscribe_status();
        assert!(status.borrow().buffering);

        harness.play("a");
        harness.send(Message::Playback(PlaybackMessage::SetVolume(30)));
        harness.send(Message::Playback(PlaybackMessage::TimeUpdate {
            doc_id: "a".to_string(),
            position_secs: 42.0,
        }));

        let status = status.borrow();
        assert_eq!(status.doc_id.as_deref(), Some("a"));
        assert_eq!(status.state, PlaybackState::Playing);
        assert_eq!(status.timer_text, "0:42 / 2:00");
        assert_eq!(status.volume_level, VolumeLevel::Low);
        assert!(!status.buffering);
    }

    #[test]
    fn test_fullscreen_hides_playlist() {
        let mut harness = PlayerManagerHarness::new(&["a"]);
        let receiver = harness.manager.subscribe_playlist();
        harness.send(Message::Playlist(PlaylistMessage::SetPlaylistHidden(true)));
        assert!(receiver.borrow().playlist_hidden);
    }
}
