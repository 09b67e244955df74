//! Session-scoped and cross-session key/value persistence for playback state.
//!
//! Session values (current index, seek timestamp, speed, autoplay flag) live
//! only as long as the playback session. Volume is written to the durable
//! store and survives restarts.

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
};

use log::{debug, warn};

pub mod keys {
    pub const CURRENT_ITEM_INDEX: &str = "current_item_index";
    pub const PLAYBACK_SPEED: &str = "playback_speed";
    pub const SEEK_TIMESTAMP: &str = "seek_timestamp";
    pub const SOURCE_UPDATED: &str = "source_updated";
    pub const VOLUME: &str = "volume";
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode state file: {0}")]
    Encode(#[from] toml::ser::Error),
}

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str);
}

/// Process-lifetime store backing session-scoped values.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// Durable store kept as a flat `key = "value"` TOML file.
#[derive(Debug)]
pub struct TomlFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl TomlFileStore {
    /// Opens `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<BTreeMap<String, String>>(&content).unwrap_or_else(
                |err| {
                    warn!(
                        "State file {} is malformed, starting empty: {}",
                        path.display(),
                        err
                    );
                    BTreeMap::new()
                },
            ),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!("Failed to read state file {}: {}", path.display(), err);
                BTreeMap::new()
            }
        };
        Self { path, values }
    }

    fn flush(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string(&self.values)?;
        std::fs::write(&self.path, content).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn flush_logged(&self) {
        if let Err(err) = self.flush() {
            warn!("Failed to persist playback state: {}", err);
        }
    }
}

impl KeyValueStore for TomlFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        if self.values.get(key) == Some(&value) {
            return;
        }
        self.values.insert(key.to_string(), value);
        self.flush_logged();
    }

    fn remove(&mut self, key: &str) {
        if self.values.remove(key).is_some() {
            self.flush_logged();
        }
    }
}

/// Typed access to the playback keys across both stores.
pub struct SessionStorage {
    session: Box<dyn KeyValueStore>,
    durable: Box<dyn KeyValueStore>,
}

impl SessionStorage {
    pub fn new(session: Box<dyn KeyValueStore>, durable: Box<dyn KeyValueStore>) -> Self {
        Self { session, durable }
    }

    /// Both stores in memory; nothing outlives the process.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    fn parse<T: std::str::FromStr>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
        let raw = store.get(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                debug!("Ignoring unparsable stored value {}={:?}", key, raw);
                None
            }
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        Self::parse(self.session.as_ref(), keys::CURRENT_ITEM_INDEX)
    }

    pub fn set_current_index(&mut self, index: usize) {
        self.session
            .set(keys::CURRENT_ITEM_INDEX, index.to_string());
    }

    pub fn seek_timestamp(&self) -> Option<f64> {
        Self::parse::<f64>(self.session.as_ref(), keys::SEEK_TIMESTAMP)
            .filter(|value| value.is_finite() && *value >= 0.0)
    }

    pub fn set_seek_timestamp(&mut self, seconds: f64) {
        self.session.set(keys::SEEK_TIMESTAMP, seconds.to_string());
    }

    pub fn playback_speed(&self) -> Option<f32> {
        Self::parse::<f32>(self.session.as_ref(), keys::PLAYBACK_SPEED)
            .filter(|value| value.is_finite() && *value > 0.0)
    }

    pub fn set_playback_speed(&mut self, rate: f32) {
        self.session.set(keys::PLAYBACK_SPEED, rate.to_string());
    }

    /// Drops the values tied to the previously loaded item.
    pub fn clear_item_scoped(&mut self) {
        self.session.remove(keys::SEEK_TIMESTAMP);
        self.session.remove(keys::PLAYBACK_SPEED);
    }

    pub fn source_updated(&self) -> bool {
        self.session.get(keys::SOURCE_UPDATED).as_deref() == Some("true")
    }

    pub fn set_source_updated(&mut self, updated: bool) {
        self.session
            .set(keys::SOURCE_UPDATED, updated.to_string());
    }

    /// Stored as a 0.0..=1.0 fraction; returned on the 0..=100 scale.
    pub fn volume(&self) -> Option<u8> {
        Self::parse::<f32>(self.durable.as_ref(), keys::VOLUME)
            .filter(|fraction| fraction.is_finite())
            .map(|fraction| (fraction.clamp(0.0, 1.0) * 100.0).round() as u8)
    }

    pub fn set_volume(&mut self, level: u8) {
        let fraction = f32::from(level.min(100)) / 100.0;
        self.durable.set(keys::VOLUME, fraction.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::{keys, KeyValueStore, MemoryStore, SessionStorage, TomlFileStore};

    #[test]
    fn test_volume_round_trips_through_fraction() {
        let mut storage = SessionStorage::in_memory();
        storage.set_volume(80);
        assert_eq!(storage.volume(), Some(80));
        storage.set_volume(250);
        assert_eq!(storage.volume(), Some(100));
    }

    #[test]
    fn test_clear_item_scoped_keeps_index_and_volume() {
        let mut storage = SessionStorage::in_memory();
        storage.set_current_index(3);
        storage.set_seek_timestamp(42.0);
        storage.set_playback_speed(1.5);
        storage.set_volume(30);

        storage.clear_item_scoped();

        assert_eq!(storage.current_index(), Some(3));
        assert_eq!(storage.seek_timestamp(), None);
        assert_eq!(storage.playback_speed(), None);
        assert_eq!(storage.volume(), Some(30));
    }

    #[test]
    fn test_unparsable_values_read_as_absent() {
        let mut session = MemoryStore::new();
        session.set(keys::CURRENT_ITEM_INDEX, "banana".to_string());
        session.set(keys::SEEK_TIMESTAMP, "-4".to_string());
        let storage = SessionStorage::new(Box::new(session), Box::new(MemoryStore::new()));
        assert_eq!(storage.current_index(), None);
        assert_eq!(storage.seek_timestamp(), None);
    }

    #[test]
    fn test_toml_file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("state.toml");

        let mut store = TomlFileStore::open(&path);
        store.set(keys::VOLUME, "0.8".to_string());
        drop(store);

        let reopened = TomlFileStore::open(&path);
        assert_eq!(reopened.get(keys::VOLUME).as_deref(), Some("0.8"));
    }

    #[test]
    fn test_toml_file_store_tolerates_malformed_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "this is = = not toml").expect("write");

        let store = TomlFileStore::open(&path);
        assert_eq!(store.get(keys::VOLUME), None);
    }
}
