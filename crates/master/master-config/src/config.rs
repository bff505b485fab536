use chomp_state::MAX_AGENTS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Smallest board edge the orchestrator accepts.
pub const MIN_BOARD_SIZE: u16 = 10;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct MasterConfig {
    #[serde(default = "defaults::board_size")]
    pub width: u16,
    #[serde(default = "defaults::board_size")]
    pub height: u16,
    /// Pause after every rendered frame.
    #[serde(default = "defaults::delay_ms")]
    pub delay_ms: u64,
    /// Upper bound for one readiness wait on the agent pipes.
    #[serde(default = "defaults::turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// Global inactivity timeout, `0` disables it.
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub view: Option<PathBuf>,
    #[serde(default)]
    pub players: Vec<PathBuf>,
    #[serde(default = "defaults::state_shm")]
    pub state_shm: String,
    #[serde(default = "defaults::sync_shm")]
    pub sync_shm: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

mod defaults {
    pub fn board_size() -> u16 {
        super::MIN_BOARD_SIZE
    }

    pub fn delay_ms() -> u64 {
        200
    }

    pub fn turn_timeout_ms() -> u64 {
        100
    }

    pub fn timeout_secs() -> u64 {
        10
    }

    pub fn state_shm() -> String {
        "/game_state".into()
    }

    pub fn sync_shm() -> String {
        "/game_sync".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            width: defaults::board_size(),
            height: defaults::board_size(),
            delay_ms: defaults::delay_ms(),
            turn_timeout_ms: defaults::turn_timeout_ms(),
            timeout_secs: defaults::timeout_secs(),
            seed: None,
            view: None,
            players: Vec::new(),
            state_shm: defaults::state_shm(),
            sync_shm: defaults::sync_shm(),
            log_level: defaults::log_level(),
        }
    }
}

impl MasterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let toml_to_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let master_config: MasterConfig = toml::from_str(&toml_to_str)?;
        Ok(master_config)
    }

    /// Check the values a game cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < MIN_BOARD_SIZE || self.height < MIN_BOARD_SIZE {
            return Err(ConfigError::Invalid(format!(
                "board is {}x{}, minimum is {MIN_BOARD_SIZE}x{MIN_BOARD_SIZE}",
                self.width, self.height
            )));
        }
        if self.players.is_empty() || self.players.len() > MAX_AGENTS {
            return Err(ConfigError::Invalid(format!(
                "{} players given, need 1 to {MAX_AGENTS}",
                self.players.len()
            )));
        }
        if self.turn_timeout_ms == 0 {
            return Err(ConfigError::Invalid("turn timeout must be non-zero".into()));
        }
        if self.state_shm == self.sync_shm {
            return Err(ConfigError::Invalid(format!(
                "state and sync regions share the name '{}'",
                self.state_shm
            )));
        }
        Ok(())
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_timeout_ms)
    }

    /// `None` when the inactivity timeout is disabled.
    pub fn inactivity_timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
