//! Persistent application configuration model and defaults.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::playback::session::SessionSettings;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Playback controls behavior.
    pub playback: PlaybackConfig,
    #[serde(default)]
    /// Where the playlist collection and durable state live.
    pub storage: StorageConfig,
    #[serde(default)]
    /// Log output preferences.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Delay before a timeline seek is handed to the media engine.
    #[serde(default = "default_seek_debounce_ms")]
    pub seek_debounce_ms: u64,
    /// Jump size for the back/forward keys.
    #[serde(default = "default_seek_step_secs")]
    pub seek_step_secs: u32,
    /// Volume (0-100) used until the listener changes it.
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    #[serde(default = "default_min_speed")]
    pub min_speed: f32,
    #[serde(default = "default_max_speed")]
    pub max_speed: f32,
    /// Spacing between offered speed options.
    #[serde(default = "default_speed_step")]
    pub speed_step: f32,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    /// Playlist collection file; defaults under the user data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Cross-session playback state file; defaults next to `config.toml`.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            seek_debounce_ms: default_seek_debounce_ms(),
            seek_step_secs: default_seek_step_secs(),
            default_volume: default_volume(),
            min_speed: default_min_speed(),
            max_speed: default_max_speed(),
            speed_step: default_speed_step(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl PlaybackConfig {
    /// Speed options offered by the speed menu, ascending.
    pub fn speed_options(&self) -> Vec<f32> {
        let mut options = Vec::new();
        let mut index = 1u32;
        loop {
            let speed = self.speed_step * index as f32;
            if speed > self.max_speed + f32::EPSILON {
                break;
            }
            if speed + f32::EPSILON >= self.min_speed {
                options.push(speed);
            }
            index += 1;
        }
        options
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            min_speed: self.min_speed,
            max_speed: self.max_speed,
            default_volume: self.default_volume,
        }
    }
}

impl StorageConfig {
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("reelist")
                .join("playlist.db")
        })
    }

    pub fn resolved_state_path(&self, config_root: &Path) -> PathBuf {
        self.state_path
            .clone()
            .unwrap_or_else(|| config_root.join("state.toml"))
    }
}

fn default_seek_debounce_ms() -> u64 {
    300
}

fn default_seek_step_secs() -> u32 {
    10
}

fn default_volume() -> u8 {
    50
}

fn default_min_speed() -> f32 {
    0.25
}

fn default_max_speed() -> f32 {
    2.0
}

fn default_speed_step() -> f32 {
    0.25
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn sanitize_config(config: Config) -> Config {
    let finite_or = |value: f32, default: f32| if value.is_finite() { value } else { default };
    let min_speed = finite_or(config.playback.min_speed, default_min_speed()).clamp(0.0625, 4.0);
    let max_speed =
        finite_or(config.playback.max_speed, default_max_speed()).clamp(min_speed, 4.0);
    let speed_step = if config.playback.speed_step.is_finite() && config.playback.speed_step > 0.0
    {
        config.playback.speed_step.clamp(0.05, 1.0)
    } else {
        default_speed_step()
    };
    let level = match config.logging.level.to_ascii_lowercase().as_str() {
        level @ ("off" | "error" | "warn" | "info" | "debug" | "trace") => level.to_string(),
        other => {
            warn!("Unknown log level {:?}, using info", other);
            default_log_level()
        }
    };

    Config {
        playback: PlaybackConfig {
            seek_debounce_ms: config.playback.seek_debounce_ms.clamp(50, 2_000),
            seek_step_secs: config.playback.seek_step_secs.clamp(1, 120),
            default_volume: config.playback.default_volume.min(100),
            min_speed,
            max_speed,
            speed_step,
        },
        storage: config.storage,
        logging: LoggingConfig { level },
    }
}

/// Reads `config_file`, writing a default one first when it does not exist.
pub fn load_or_create_config(config_file: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if !config_file.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        if let Some(parent) = config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(
            config_file,
            toml::to_string(&sanitize_config(Config::default()))?,
        )?;
    }

    let content = std::fs::read_to_string(config_file)?;
    let config = toml::from_str::<Config>(&content).unwrap_or_else(|err| {
        warn!(
            "Config file {} is invalid, using defaults: {}",
            config_file.display(),
            err
        );
        Config::default()
    });
    Ok(sanitize_config(config))
}
