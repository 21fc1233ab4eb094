//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and protocol settings.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Listener and protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the listener binds to.
    pub bind_address: String,
    /// Port the listener binds to.
    pub port: u16,
    /// Message of the day shown in the server list.
    pub motd: String,
    /// Require the encryption handshake during login.
    pub online_mode: bool,
    /// Packets at least this large are compressed. Negative disables compression.
    pub compression_threshold: i32,
    /// Player limit reported in the server list.
    pub max_players: u32,
    /// Main-thread ticks per second.
    pub tick_rate: u32,
    /// Seconds between keep-alive packets sent to players.
    pub keep_alive_seconds: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log every dropped or undecodable packet.
    pub verbose_packets: bool,
    /// Also write JSON logs to a file in the config directory.
    pub file_logging: bool,
}

// --- Default implementations ---

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 25565,
            motd: "A Tether server".to_string(),
            online_mode: false,
            compression_threshold: 256,
            max_players: 20,
            tick_rate: 20,
            keep_alive_seconds: 15,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            verbose_packets: false,
            file_logging: false,
        }
    }
}

impl NetworkConfig {
    /// `bind_address:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Compression threshold, or `None` when compression is disabled.
    pub fn compression(&self) -> Option<u32> {
        u32::try_from(self.compression_threshold).ok()
    }
}

// --- Persistence ---

/// File name of the config inside its directory.
pub const CONFIG_FILE: &str = "config.ron";

impl Config {
    /// Platform config directory for Tether, e.g. `~/.config/tether`.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("tether"))
            .ok_or(ConfigError::NoConfigDir)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&text).map_err(ConfigError::ParseError)
    }

    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// if it does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Self::default();
            config.save(config_dir)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        let config = Self::read(&path)?;
        log::info!("Using config {}", path.display());
        Ok(config)
    }

    /// Write `config.ron` into `config_dir`, creating the directory if needed.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .struct_names(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;
        std::fs::write(config_dir.join(CONFIG_FILE), text).map_err(ConfigError::WriteError)
    }

    /// Re-read the file. `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("Config changed on disk");
        Ok(Some(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let text = ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new()).unwrap();
        for field in ["port: 25565", "online_mode: false", "compression_threshold: 256"] {
            assert!(text.contains(field), "missing {field}");
        }
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(network: (port: 25566))").unwrap();
        assert_eq!(config.network.port, 25566);
        assert_eq!(config.network.bind_address, "0.0.0.0");
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn test_negative_threshold_disables_compression() {
        let mut network = NetworkConfig::default();
        assert_eq!(network.compression(), Some(256));
        network.compression_threshold = -1;
        assert_eq!(network.compression(), None);
    }

    #[test]
    fn test_listen_addr() {
        assert_eq!(NetworkConfig::default().listen_addr(), "0.0.0.0:25565");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.network.motd = "Limbo".to_string();
        config.network.online_mode = true;
        config.debug.verbose_packets = true;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.network.max_players = 100;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.network.max_players), Some(100));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "(network: [oops").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
