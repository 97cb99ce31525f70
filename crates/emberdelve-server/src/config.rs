//! Server configuration

use std::net::SocketAddr;
use std::path::Path;

use emberdelve_core::{GridSettings, SettingsError};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server
    pub bind_address: SocketAddr,
    /// Minimum connected players before a game may start
    pub min_players_to_start: u8,
    /// Maximum connections admitted; later ones are refused
    pub max_connections: u8,
    /// Dungeon layout parameters
    pub grid: GridSettings,
    /// Fixed dungeon seed; None draws a fresh seed per game
    pub seed: Option<u64>,
    /// Highscore service endpoints; None disables score submission
    pub score_service: Option<ScoreServiceConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7777".parse().unwrap(),
            min_players_to_start: 2,
            max_connections: 4,
            grid: GridSettings::default(),
            seed: None,
            score_service: None,
        }
    }
}

/// Highscore service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreServiceConfig {
    /// Endpoint receiving `?playerName=...&score=...` submissions
    pub submit_url: String,
    /// Endpoint returning the current highscore table
    pub fetch_url: String,
    /// Per-request timeout and the bound on the end-of-game settle wait
    pub submit_timeout_ms: u64,
}

impl Default for ScoreServiceConfig {
    fn default() -> Self {
        Self {
            submit_url: "http://127.0.0.1:8080/submit_highscore.php".to_string(),
            fetch_url: "http://127.0.0.1:8080/highscores.php".to_string(),
            submit_timeout_ms: 3000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file and validate it
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.display().to_string(), e))?;
        let config: ServerConfig = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks the deserializer cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0
            || self.min_players_to_start == 0
            || self.min_players_to_start > self.max_connections
        {
            return Err(ConfigError::PlayerRange {
                min: self.min_players_to_start,
                max: self.max_connections,
            });
        }
        self.grid.validate()?;
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid player range {min}..={max}")]
    PlayerRange { min: u8, max: u8 },

    #[error(transparent)]
    Grid(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_yaml_overrides_defaults() {
        let config: ServerConfig = serde_yaml::from_str(
            "max_connections: 6\ngrid:\n  width: 8\n  height: 2\n",
        )
        .unwrap();
        assert_eq!(config.max_connections, 6);
        assert_eq!(config.grid.width, 8);
        assert_eq!(config.grid.height, 2);
        // Untouched fields keep their defaults.
        assert_eq!(config.min_players_to_start, 2);
        assert_eq!(config.grid.treasure_count, 3);
        assert!(config.score_service.is_none());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ServerConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PlayerRange { .. })
        ));
    }

    #[test]
    fn start_minimum_above_capacity_is_rejected() {
        let config = ServerConfig {
            min_players_to_start: 5,
            max_connections: 4,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PlayerRange { min: 5, max: 4 })
        ));
    }

    #[test]
    fn grid_faults_surface_through_validate() {
        let mut config = ServerConfig::default();
        config.grid.width = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Grid(_))));
    }

    #[test]
    fn score_service_yaml_round() {
        let config: ServerConfig = serde_yaml::from_str(
            "score_service:
              submit_url: http://scores.local/submit
              fetch_url: http://scores.local/top
              submit_timeout_ms: 1500",
        )
        .unwrap();
        let service = config.score_service.expect("service configured");
        assert_eq!(service.submit_url, "http://scores.local/submit");
        assert_eq!(service.submit_timeout_ms, 1500);
    }
}
