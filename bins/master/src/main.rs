use anyhow::Context;
use clap::{ArgAction, Parser};
use master_config::MasterConfig;
use master_engine::Orchestrator;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run one game: create the shared regions, spawn the renderer and agents,
/// schedule them round-robin and print the final ranking.
#[derive(Parser, Debug)]
#[command(name = "master", version, about, disable_help_flag = true)]
struct Cli {
    /// Board width (minimum 10).
    #[arg(short, long)]
    width: Option<u16>,

    /// Board height (minimum 10).
    #[arg(short, long)]
    height: Option<u16>,

    /// Renderer executable.
    #[arg(short, long)]
    view: Option<PathBuf>,

    /// Agent executable, once per agent (1 to 9).
    #[arg(short = 'p', long = "player")]
    players: Vec<PathBuf>,

    /// Pause after each frame with a valid move, in milliseconds.
    #[arg(short, long)]
    delay: Option<u64>,

    /// Upper bound of one wait on the agent pipes, in milliseconds.
    #[arg(long)]
    turn_timeout: Option<u64>,

    /// Seconds without a valid move before the game ends; 0 disables.
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Seed for the reward grid; defaults to the current time.
    #[arg(short, long)]
    seed: Option<u64>,

    /// TOML file with defaults for every option above.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    state_shm: Option<String>,

    #[arg(long)]
    sync_shm: Option<String>,

    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<MasterConfig> {
        let mut config = match &self.config {
            Some(path) => MasterConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => MasterConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(height) = self.height {
            config.height = height;
        }
        if self.view.is_some() {
            config.view = self.view;
        }
        if !self.players.is_empty() {
            config.players = self.players;
        }
        if let Some(delay) = self.delay {
            config.delay_ms = delay;
        }
        if let Some(turn_timeout) = self.turn_timeout {
            config.turn_timeout_ms = turn_timeout;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(state_shm) = self.state_shm {
            config.state_shm = state_shm;
        }
        if let Some(sync_shm) = self.sync_shm {
            config.sync_shm = sync_shm;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let orchestrator = Orchestrator::setup(config).context("failed to start the game")?;
    info!(seed = orchestrator.seed(), "orchestrator ready");
    let report = orchestrator.run().context("game aborted")?;

    print!("{report}");
    Ok(())
}
