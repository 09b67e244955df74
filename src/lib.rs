pub mod config;
pub mod console;
pub mod db_manager;
pub mod playback;
pub mod player_manager;
pub mod playlist;
pub mod protocol;
pub mod remote;
pub mod services;
pub mod session_storage;
pub mod sync_manager;
