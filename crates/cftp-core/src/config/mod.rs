//! Configuration management for CFTP.
//!
//! ## Configuration File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/cftp/config.toml` |
//! | macOS | `~/Library/Application Support/org.cftp.cftp/config.toml` |
//! | Windows | `%APPDATA%\cftp\cftp\config\config.toml` |
//!
//! Every section and key is optional; missing values fall back to defaults.
//!
//! ```toml
//! [network]
//! port = 9400
//! connect_timeout = "10s"
//!
//! [transfer]
//! chunk_size = 65536
//! read_timeout = "60s"   # "0s" waits forever
//!
//! [server]
//! transfer_dir = "/srv/incoming"
//! quota = 1073741824
//! client_mode = "multi"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::MAX_DATA_SIZE;
use crate::session::QuotaPolicy;

/// Main configuration struct for CFTP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network settings
    pub network: NetworkConfig,
    /// Transfer settings
    pub transfer: TransferConfig,
    /// Receiver settings
    pub server: ServerConfig,
}

/// Network configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the receiver listens on
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Time allowed to establish a connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_PORT,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Transfer configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Chunk size announced by senders
    pub chunk_size: u32,
    /// Attempts per chunk before a sender gives up
    pub max_retries: u32,
    /// Limit on every frame and payload read or write (zero disables)
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            max_retries: crate::MAX_RETRIES,
            read_timeout: Duration::from_secs(60),
        }
    }
}

impl TransferConfig {
    /// Timeout to hand to a channel, `None` when disabled.
    pub fn io_timeout(&self) -> Option<Duration> {
        (!self.read_timeout.is_zero()).then_some(self.read_timeout)
    }
}

/// How many clients a receiver serves before exiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMode {
    /// Serve one transfer, then stop
    #[default]
    Single,
    /// Keep accepting clients one after another
    Multi,
}

/// Receiver configuration options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory received files are written to
    pub transfer_dir: PathBuf,
    /// Largest accepted file in bytes (None for unlimited)
    pub quota: Option<u64>,
    /// Single or multi client operation
    pub client_mode: ClientMode,
    /// Largest chunk size a sender may announce
    pub max_chunk_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transfer_dir: PathBuf::from("."),
            quota: None,
            client_mode: ClientMode::Single,
            max_chunk_size: crate::DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl ServerConfig {
    /// Admission policy built from the quota and chunk limit.
    pub const fn admission_policy(&self) -> QuotaPolicy {
        QuotaPolicy {
            quota: self.quota,
            max_chunk_size: self.max_chunk_size,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// If the configuration file doesn't exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, defaulting when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::ConfigError(format!("failed to create config directory: {e}"))
            })?;
        }

        std::fs::write(path, self.to_toml()?)
            .map_err(|e| Error::ConfigError(format!("failed to write config: {e}")))
    }

    /// Render as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("failed to serialize config: {e}")))
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, reason: String| Error::InvalidConfig {
            key: key.to_string(),
            reason,
        };

        if self.transfer.chunk_size == 0 || u64::from(self.transfer.chunk_size) > MAX_DATA_SIZE {
            return Err(invalid(
                "transfer.chunk_size",
                format!("must be between 1 and {MAX_DATA_SIZE}"),
            ));
        }
        if self.transfer.max_retries == 0 {
            return Err(invalid("transfer.max_retries", "must be at least 1".to_string()));
        }
        if self.server.max_chunk_size == 0 || u64::from(self.server.max_chunk_size) > MAX_DATA_SIZE
        {
            return Err(invalid(
                "server.max_chunk_size",
                format!("must be between 1 and {MAX_DATA_SIZE}"),
            ));
        }
        if self.network.connect_timeout.is_zero() {
            return Err(invalid("network.connect_timeout", "must be positive".to_string()));
        }

        Ok(())
    }

    /// Address a receiver binds to.
    ///
    /// # Errors
    ///
    /// Returns an error if `network.host` is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        crate::connection::parse_host_address(&self.network.host, self.network.port)
    }

    /// Get the default configuration directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "cftp", "cftp")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the full path to the configuration file.
    pub fn config_path() -> PathBuf {
        Self::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }
}

mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = duration.as_secs();
        if secs >= 60 && secs % 60 == 0 {
            serializer.serialize_str(&format!("{}m", secs / 60))
        } else {
            serializer.serialize_str(&format!("{secs}s"))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.trim();

        let (digits, scale) = if let Some(mins) = s.strip_suffix('m') {
            (mins, 60)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, 1)
        } else {
            return Err(serde::de::Error::custom(format!(
                "invalid duration '{s}', expected e.g. \"30s\" or \"5m\""
            )));
        };

        let n = digits
            .trim()
            .parse::<u64>()
            .map_err(serde::de::Error::custom)?;
        n.checked_mul(scale)
            .map(Duration::from_secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration '{s}' is too large")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.network.port, 9400);
        assert_eq!(config.transfer.chunk_size, 64 * 1024);
        assert_eq!(config.transfer.max_retries, 10);
        assert_eq!(config.transfer.io_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(config.server.client_mode, ClientMode::Single);
        assert_eq!(config.server.quota, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.network.port = 12345;
        original.transfer.chunk_size = 4096;
        original.transfer.read_timeout = Duration::from_secs(90);
        original.server.quota = Some(1_000_000);
        original.server.client_mode = ClientMode::Multi;
        original.server.transfer_dir = PathBuf::from("/srv/incoming");

        original.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Config::load_from(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_config_deserialization_partial() {
        let partial_toml = r#"
[transfer]
read_timeout = "5m"

[server]
client_mode = "multi"
"#;

        let config: Config = toml::from_str(partial_toml).expect("parse partial config");

        assert_eq!(config.transfer.read_timeout, Duration::from_secs(300));
        assert_eq!(config.server.client_mode, ClientMode::Multi);
        assert_eq!(config.transfer.chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert_eq!(config.network.port, crate::DEFAULT_PORT);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config: Config = toml::from_str("[transfer]\nread_timeout = \"0s\"\n").unwrap();
        assert_eq!(config.transfer.io_timeout(), None);
    }

    #[test]
    fn test_duration_serialization() {
        let toml_str = Config::default().to_toml().unwrap();
        assert!(toml_str.contains("read_timeout = \"1m\""));
        assert!(toml_str.contains("connect_timeout = \"10s\""));
        assert!(toml_str.contains("client_mode = \"single\""));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[transfer]\nread_timeout = \"soon\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_overflowing_duration_rejected() {
        let result: std::result::Result<Config, _> =
            toml::from_str("[network]\nconnect_timeout = \"18446744073709551615m\"\n");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.transfer.chunk_size = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig { ref key, .. }) if key == "transfer.chunk_size"
        ));

        let mut config = Config::default();
        config.transfer.max_retries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.max_chunk_size = u32::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[network\nport = ").unwrap();

        assert!(matches!(Config::load_from(&path), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_listen_addr_and_policy() {
        let mut config = Config::default();
        config.network.host = "127.0.0.1".to_string();
        config.network.port = 9500;
        config.server.quota = Some(42);

        assert_eq!(config.listen_addr().unwrap().to_string(), "127.0.0.1:9500");
        assert_eq!(config.server.admission_policy().quota, Some(42));
    }

    #[test]
    fn test_config_path() {
        assert!(Config::config_path().ends_with("config.toml"));
    }
}
