use master_config::ConfigError;
use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up shared regions '{state}' / '{sync}'")]
    Ipc {
        state: String,
        sync: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn '{}'", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("semaphore operation failed")]
    Sync(#[from] io::Error),
}
