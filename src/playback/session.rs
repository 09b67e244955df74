//! Playback session state machine.
//!
//! `Idle -> Loading -> Ready -> Playing/Paused`, back to `Loading` on
//! auto-advance, or `Idle` when nothing eligible remains. Every load is tagged
//! with the document key it was issued for; callbacks carrying any other key
//! are stale and dropped.

use log::{debug, info, warn};

use crate::{
    playback::{
        clock,
        media::{MediaError, MediaOutput},
    },
    protocol::PlaylistItem,
    session_storage::SessionStorage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
}

/// What caused an item to be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTrigger {
    /// Explicit click in the list; autoplays once ready.
    User,
    /// Natural end of the previous item; autoplays once ready.
    AutoAdvance,
    /// Silent reload of the previous session's item.
    Restore,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("item {0} is marked as skipped")]
    ItemSkipped(String),
    #[error("item {0} has no playable source")]
    NoPlayableSource(String),
    #[error("item {0} is currently playing")]
    SkipCurrentItem(String),
    #[error("playback speed {rate} outside {min}..={max}")]
    InvalidSpeed { rate: f32, min: f32, max: f32 },
}

/// Result of a metadata callback.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyOutcome {
    /// Stale tag, duplicate callback, or duration not known yet.
    Ignored,
    Ready,
    Playing,
    AutoplayBlocked(MediaError),
}

/// Icon bucket for the volume control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeLevel {
    Muted,
    Low,
    High,
}

/// Read-only view of the session for the now-playing panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub doc_id: Option<String>,
    pub state: PlaybackState,
    pub timer_text: String,
    pub playback_rate: f32,
    pub volume: u8,
    pub volume_level: VolumeLevel,
    pub buffering: bool,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            doc_id: None,
            state: PlaybackState::Idle,
            timer_text: clock::timer_text(0.0, 0.0),
            playback_rate: 1.0,
            volume: 0,
            volume_level: VolumeLevel::Muted,
            buffering: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub min_speed: f32,
    pub max_speed: f32,
    /// Volume used until the listener has ever changed it.
    pub default_volume: u8,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            min_speed: 0.25,
            max_speed: 2.0,
            default_volume: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSeek {
    generation: u64,
    target_secs: f64,
}

pub struct PlaybackSession {
    settings: SessionSettings,
    storage: SessionStorage,
    state: PlaybackState,
    active_doc_id: Option<String>,
    duration_secs: f64,
    position_secs: f64,
    playback_rate: f32,
    volume: u8,
    seek_generation: u64,
    pending_seek: Option<PendingSeek>,
}

impl PlaybackSession {
    pub fn new(settings: SessionSettings, storage: SessionStorage) -> Self {
        let volume = storage.volume().unwrap_or(settings.default_volume.min(100));
        Self {
            settings,
            storage,
            state: PlaybackState::Idle,
            active_doc_id: None,
            duration_secs: 0.0,
            position_secs: 0.0,
            playback_rate: 1.0,
            volume,
            seek_generation: 0,
            pending_seek: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn active_doc_id(&self) -> Option<&str> {
        self.active_doc_id.as_deref()
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    pub fn position_secs(&self) -> f64 {
        self.position_secs
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn volume_level(&self) -> VolumeLevel {
        match self.volume {
            0 => VolumeLevel::Muted,
            1..=49 => VolumeLevel::Low,
            _ => VolumeLevel::High,
        }
    }

    pub fn timer_text(&self) -> String {
        clock::timer_text(self.position_secs, self.duration_secs)
    }

    /// Loading, or a debounced seek has not reached the media engine yet.
    pub fn is_buffering(&self) -> bool {
        self.state == PlaybackState::Loading || self.pending_seek.is_some()
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            doc_id: self.active_doc_id.clone(),
            state: self.state,
            timer_text: self.timer_text(),
            playback_rate: self.playback_rate,
            volume: self.volume,
            volume_level: self.volume_level(),
            buffering: self.is_buffering(),
        }
    }

    pub fn autoplay_requested(&self) -> bool {
        self.storage.source_updated()
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    fn has_duration(&self) -> bool {
        matches!(
            self.state,
            PlaybackState::Ready | PlaybackState::Playing | PlaybackState::Paused
        )
    }

    fn is_active(&self, doc_id: &str) -> bool {
        self.active_doc_id.as_deref() == Some(doc_id)
    }

    fn drop_pending_seek(&mut self) {
        self.pending_seek = None;
        self.seek_generation += 1;
    }

    fn go_idle(&mut self) {
        self.drop_pending_seek();
        self.state = PlaybackState::Idle;
        self.active_doc_id = None;
        self.duration_secs = 0.0;
        self.position_secs = 0.0;
    }

    /// Index to restore after a fetch; records 0 when nothing was stored.
    pub fn restore_index(&mut self, playlist_len: usize) -> usize {
        match self.storage.current_index() {
            Some(index) if index < playlist_len => index,
            stored => {
                if let Some(index) = stored {
                    warn!(
                        "Stored item index {} is outside a playlist of {}, restarting at 0",
                        index, playlist_len
                    );
                }
                self.storage.set_current_index(0);
                0
            }
        }
    }

    /// Keeps the stored current index aligned after a reorder moved the item.
    pub fn note_current_position(&mut self, position: usize) {
        self.storage.set_current_index(position);
    }

    pub fn select_item(
        &mut self,
        item: &PlaylistItem,
        trigger: SelectionTrigger,
        media: &mut dyn MediaOutput,
    ) -> Result<(), SessionError> {
        if trigger == SelectionTrigger::User && item.skip {
            return Err(SessionError::ItemSkipped(item.doc_id.clone()));
        }
        let source = item
            .primary_source()
            .ok_or_else(|| SessionError::NoPlayableSource(item.doc_id.clone()))?;

        if trigger != SelectionTrigger::Restore {
            self.storage.clear_item_scoped();
            self.storage.set_source_updated(true);
            self.playback_rate = 1.0;
        }
        self.storage.set_current_index(item.position);

        self.drop_pending_seek();
        self.state = PlaybackState::Loading;
        self.active_doc_id = Some(item.doc_id.clone());
        self.duration_secs = 0.0;
        self.position_secs = 0.0;
        media.load_source(&item.doc_id, source, &item.thumb);
        info!(
            "Selected \"{}\" ({}) at position {} via {:?}",
            item.title, item.doc_id, item.position, trigger
        );
        Ok(())
    }

    pub fn on_metadata_ready(
        &mut self,
        doc_id: &str,
        duration_secs: f64,
        media: &mut dyn MediaOutput,
    ) -> ReadyOutcome {
        if !self.is_active(doc_id) {
            debug!("Ignoring stale metadata for {}", doc_id);
            return ReadyOutcome::Ignored;
        }
        if self.state != PlaybackState::Loading {
            return ReadyOutcome::Ignored;
        }
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            debug!("Duration for {} not known yet ({})", doc_id, duration_secs);
            return ReadyOutcome::Ignored;
        }

        self.duration_secs = duration_secs;
        self.state = PlaybackState::Ready;

        if let Some(volume) = self.storage.volume() {
            self.volume = volume;
        }
        media.set_volume(f32::from(self.volume) / 100.0);

        self.playback_rate = self
            .storage
            .playback_speed()
            .filter(|rate| self.speed_in_range(*rate))
            .unwrap_or(1.0);
        media.set_playback_rate(self.playback_rate);

        match self.storage.seek_timestamp() {
            Some(timestamp) => {
                self.position_secs = timestamp.clamp(0.0, duration_secs);
                media.seek_to(self.position_secs);
            }
            None => self.position_secs = 0.0,
        }

        if !self.storage.source_updated() {
            return ReadyOutcome::Ready;
        }
        self.storage.set_source_updated(false);
        match media.play() {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                ReadyOutcome::Playing
            }
            Err(err) => {
                warn!("Autoplay for {} failed, staying paused: {}", doc_id, err);
                self.state = PlaybackState::Paused;
                ReadyOutcome::AutoplayBlocked(err)
            }
        }
    }

    /// Moves the displayed position now and returns the tag of the deferred
    /// engine seek, or `None` while no duration is known.
    pub fn seek(&mut self, target_secs: f64) -> Option<u64> {
        if !self.has_duration() || !target_secs.is_finite() {
            return None;
        }
        let target_secs = target_secs.clamp(0.0, self.duration_secs);
        self.position_secs = target_secs;
        self.seek_generation += 1;
        self.pending_seek = Some(PendingSeek {
            generation: self.seek_generation,
            target_secs,
        });
        self.storage.set_seek_timestamp(target_secs);
        Some(self.seek_generation)
    }

    pub fn seek_relative(&mut self, delta_secs: f64) -> Option<u64> {
        self.seek(self.position_secs + delta_secs)
    }

    /// Hands the pending seek to the engine if `generation` is still the latest.
    pub fn apply_pending_seek(&mut self, generation: u64, media: &mut dyn MediaOutput) -> bool {
        match self.pending_seek {
            Some(pending) if pending.generation == generation => {
                self.pending_seek = None;
                media.seek_to(pending.target_secs);
                true
            }
            _ => {
                debug!("Dropping superseded seek timer {}", generation);
                false
            }
        }
    }

    pub fn on_time_update(&mut self, doc_id: &str, position_secs: f64) {
        if !self.is_active(doc_id) || !self.has_duration() || self.pending_seek.is_some() {
            return;
        }
        if position_secs.is_finite() {
            self.position_secs = position_secs.clamp(0.0, self.duration_secs);
        }
    }

    pub fn play(&mut self, media: &mut dyn MediaOutput) -> Result<(), MediaError> {
        match self.state {
            PlaybackState::Ready | PlaybackState::Paused => match media.play() {
                Ok(()) => {
                    self.state = PlaybackState::Playing;
                    Ok(())
                }
                Err(err) => {
                    self.state = PlaybackState::Paused;
                    Err(err)
                }
            },
            // Starts as soon as metadata arrives.
            PlaybackState::Loading => {
                self.storage.set_source_updated(true);
                Ok(())
            }
            PlaybackState::Playing | PlaybackState::Idle => Ok(()),
        }
    }

    pub fn pause(&mut self, media: &mut dyn MediaOutput) {
        match self.state {
            PlaybackState::Playing => {
                media.pause();
                self.state = PlaybackState::Paused;
            }
            PlaybackState::Loading => self.storage.set_source_updated(false),
            _ => {}
        }
    }

    pub fn toggle_play(&mut self, media: &mut dyn MediaOutput) -> Result<(), MediaError> {
        if self.state == PlaybackState::Playing {
            self.pause(media);
            return Ok(());
        }
        self.play(media)
    }

    pub fn on_playback_failed(&mut self, doc_id: &str, reason: &str) {
        if !self.is_active(doc_id) || self.state == PlaybackState::Idle {
            return;
        }
        warn!("Playback of {} failed: {}", doc_id, reason);
        self.storage.set_source_updated(false);
        self.state = PlaybackState::Paused;
    }

    /// Natural end of `doc_id`; a stale end (already superseded) is ignored.
    pub fn on_ended(
        &mut self,
        doc_id: &str,
        items: &[PlaylistItem],
        media: &mut dyn MediaOutput,
    ) -> Option<String> {
        if !self.is_active(doc_id) {
            debug!("Ignoring end of superseded item {}", doc_id);
            return None;
        }
        self.advance(items, media)
    }

    /// Selects the next non-skipped item after the active one, or goes idle.
    pub fn advance(&mut self, items: &[PlaylistItem], media: &mut dyn MediaOutput) -> Option<String> {
        let start = self
            .active_doc_id
            .as_deref()
            .and_then(|doc_id| items.iter().position(|item| item.doc_id == doc_id))
            .map(|index| index + 1);

        if let Some(start) = start {
            for candidate in items.iter().skip(start).filter(|item| !item.skip) {
                match self.select_item(candidate, SelectionTrigger::AutoAdvance, media) {
                    Ok(()) => return Some(candidate.doc_id.clone()),
                    Err(err) => warn!("Auto-advance passed over {}: {}", candidate.doc_id, err),
                }
            }
        }

        info!("Nothing left to play, session idle");
        self.go_idle();
        None
    }

    fn speed_in_range(&self, rate: f32) -> bool {
        rate.is_finite() && rate >= self.settings.min_speed && rate <= self.settings.max_speed
    }

    pub fn set_speed(&mut self, rate: f32, media: &mut dyn MediaOutput) -> Result<(), SessionError> {
        if !self.speed_in_range(rate) {
            return Err(SessionError::InvalidSpeed {
                rate,
                min: self.settings.min_speed,
                max: self.settings.max_speed,
            });
        }
        self.playback_rate = rate;
        media.set_playback_rate(rate);
        self.storage.set_playback_speed(rate);
        Ok(())
    }

    pub fn set_volume(&mut self, level: u8, media: &mut dyn MediaOutput) {
        self.volume = level.min(100);
        media.set_volume(f32::from(self.volume) / 100.0);
        self.storage.set_volume(self.volume);
    }

    /// Returns `item` with its skip flag flipped; refuses the active item.
    pub fn toggle_skip(&self, item: &PlaylistItem) -> Result<PlaylistItem, SessionError> {
        if self.is_active(&item.doc_id) {
            return Err(SessionError::SkipCurrentItem(item.doc_id.clone()));
        }
        let mut updated = item.clone();
        updated.skip = !item.skip;
        Ok(updated)
    }
}
