//! Boundary toward the media engine that actually decodes and renders video.

use log::info;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MediaError {
    /// Runtime refused to start playback without a user gesture.
    #[error("autoplay rejected: {0}")]
    AutoplayRejected(String),
}

pub trait MediaOutput: Send {
    /// Starts loading a new source; metadata arrives later as a bus callback
    /// tagged with `doc_id`.
    fn load_source(&mut self, doc_id: &str, source: &str, poster: &str);
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn seek_to(&mut self, seconds: f64);
    fn set_playback_rate(&mut self, rate: f32);
    /// `volume` is a 0.0..=1.0 fraction.
    fn set_volume(&mut self, volume: f32);
}

/// Stand-in engine for headless runs: logs every command and always plays.
#[derive(Debug, Default)]
pub struct LoggingMediaOutput;

impl MediaOutput for LoggingMediaOutput {
    fn load_source(&mut self, doc_id: &str, source: &str, poster: &str) {
        info!(
            "media: load {} from {} (poster {})",
            doc_id, source, poster
        );
    }

    fn play(&mut self) -> Result<(), MediaError> {
        info!("media: play");
        Ok(())
    }

    fn pause(&mut self) {
        info!("media: pause");
    }

    fn seek_to(&mut self, seconds: f64) {
        info!("media: seek to {:.1}s", seconds);
    }

    fn set_playback_rate(&mut self, rate: f32) {
        info!("media: rate {}x", rate);
    }

    fn set_volume(&mut self, volume: f32) {
        info!("media: volume {:.2}", volume);
    }
}
