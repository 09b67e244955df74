//! Playback session state, the media engine boundary, and the seek debouncer.

pub mod clock;
pub mod debounce;
pub mod media;
pub mod session;
