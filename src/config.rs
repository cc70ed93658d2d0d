//! Runtime tunables for session and race pacing.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the JSON configuration is looked up.
const DEFAULT_CONFIG_PATH: &str = "config/rally.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RALLY_ROOMS_CONFIG_PATH";

/// Immutable pacing configuration shared by all sessions of a client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Starting value of the room countdown (counts down to 0).
    pub room_countdown_from: u32,
    /// Starting value of the race countdown.
    pub race_countdown_from: u32,
    /// Delay between countdown decrements.
    pub countdown_step: Duration,
    /// Logical simulation rate.
    pub tick_rate_hz: u32,
    /// Minimum spacing between replicated position writes.
    pub publish_interval: Duration,
    /// Number of chat entries kept in the visible buffer.
    pub chat_tail: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            room_countdown_from: 5,
            race_countdown_from: 3,
            countdown_step: Duration::from_millis(1000),
            tick_rate_hz: 60,
            publish_interval: Duration::from_millis(100),
            chat_tail: 50,
        }
    }
}

impl SyncConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded pacing config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => Self::default(),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Duration of one logical simulation step.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate_hz.max(1)))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
/// JSON representation of the configuration file; every field is optional and
/// overlays the defaults.
struct RawConfig {
    room_countdown_from: Option<u32>,
    race_countdown_from: Option<u32>,
    countdown_step_ms: Option<u64>,
    tick_rate_hz: Option<u32>,
    publish_interval_ms: Option<u64>,
    chat_tail: Option<usize>,
}

impl From<RawConfig> for SyncConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            room_countdown_from: raw.room_countdown_from.unwrap_or(defaults.room_countdown_from),
            race_countdown_from: raw.race_countdown_from.unwrap_or(defaults.race_countdown_from),
            countdown_step: raw
                .countdown_step_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.countdown_step),
            tick_rate_hz: raw.tick_rate_hz.unwrap_or(defaults.tick_rate_hz),
            publish_interval: raw
                .publish_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.publish_interval),
            chat_tail: raw.chat_tail.unwrap_or(defaults.chat_tail),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
