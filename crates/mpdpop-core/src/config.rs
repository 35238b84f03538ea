use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub player: PlayerConfig,
}

/// Where the music daemon listens. Re-read at every connect, so edits to
/// the settings take effect on the next (re)connection without a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "DaemonConfig::default_host")]
    pub host: String,
    #[serde(default = "DaemonConfig::default_port")]
    pub port: u16,
}

impl DaemonConfig {
    fn default_host() -> String {
        "localhost".into()
    }
    fn default_port() -> u16 {
        6600
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Delay between reconnection attempts for the idle connection.
    /// Fixed interval, no exponential growth.
    #[serde(default = "PlayerConfig::default_retry_secs")]
    pub retry_secs: u64,
    /// Interval of the elapsed-time fast poll while the popover is visible.
    #[serde(default = "PlayerConfig::default_elapsed_poll_ms")]
    pub elapsed_poll_ms: u64,
    /// Upper bound on assembled artwork size. A daemon that keeps
    /// returning chunks past this is cut off with a protocol error.
    #[serde(default = "PlayerConfig::default_artwork_max_bytes")]
    pub artwork_max_bytes: usize,
}

impl PlayerConfig {
    fn default_retry_secs() -> u64 {
        5
    }
    fn default_elapsed_poll_ms() -> u64 {
        500
    }
    fn default_artwork_max_bytes() -> usize {
        32 * 1024 * 1024
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            retry_secs: Self::default_retry_secs(),
            elapsed_poll_ms: Self::default_elapsed_poll_ms(),
            artwork_max_bytes: Self::default_artwork_max_bytes(),
        }
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("mpdpop")
    }

    pub fn config_path() -> PathBuf {
        // MPDPOP_CONFIG env var overrides for testing.
        if let Ok(path) = std::env::var("MPDPOP_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        toml::from_str(&contents).with_context(|| "parsing config TOML")
    }
}
