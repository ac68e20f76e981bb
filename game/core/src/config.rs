use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9999;

#[derive(Serialize, Deserialize, Clone)]
pub struct Server {
    /// Bind address for the authoritative socket.
    pub address: String,
    pub max_clients: u16,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Game {
    pub grid_size: u16,
    pub snapshot_rate_hz: u32,
    /// How many recent snapshots ride along in every SNAPSHOT datagram.
    pub redundancy: u8,
    /// Extra ACK-gated per-session resend of retained frames. Redundant with
    /// the embedded frames whenever `redundancy >= 2`, hence off by default.
    pub session_resend: bool,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub server: Server,
    pub game: Game,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            server: Server {
                address: format!("0.0.0.0:{}", DEFAULT_PORT),
                max_clients: 4,
            },
            game: Game {
                grid_size: 5,
                snapshot_rate_hz: 20,
                redundancy: 2,
                session_resend: false,
            },
        }
    }
}

impl ServerConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServerConfig, ConfigError> {
        let config: ServerConfig =
            serdeconv::from_toml_file(path).map_err(|err| ConfigError::Load(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Enforces the documented parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.game.grid_size < 2 || self.game.grid_size > 20 {
            return Err(ConfigError::Invalid("grid_size must be within 2..=20"));
        }
        if self.game.snapshot_rate_hz < 1 || self.game.snapshot_rate_hz > 60 {
            return Err(ConfigError::Invalid("snapshot_rate_hz must be within 1..=60"));
        }
        if self.game.redundancy < 1 || self.game.redundancy > 5 {
            return Err(ConfigError::Invalid("redundancy must be within 1..=5"));
        }
        if self.server.max_clients < 1 || self.server.max_clients > 255 {
            return Err(ConfigError::Invalid("max_clients must be within 1..=255"));
        }
        Ok(())
    }

    /// Tick interval derived from the snapshot rate.
    #[inline]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.game.snapshot_rate_hz))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Load(String),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Load(reason) => write!(f, "failed loading configuration: {}", reason),
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_tick_interval() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut config = ServerConfig::default();
        config.game.grid_size = 1;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.game.grid_size = 21;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.game.snapshot_rate_hz = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.game.redundancy = 6;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server.max_clients = 0;
        assert!(config.validate().is_err());
    }
}
