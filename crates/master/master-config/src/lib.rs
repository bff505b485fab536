mod config;

pub use config::{ConfigError, MIN_BOARD_SIZE, MasterConfig};
