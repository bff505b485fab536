//! Inspect and clean up the shared regions of a game.

use anyhow::Context;
use chomp_icc::{DEFAULT_STATE_SHM, DEFAULT_SYNC_SHM, Ipc, ShmNames, SyncBlock};
use clap::{Parser, Subcommand};
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shm-tool", version, about)]
struct Cli {
    #[arg(long, global = true, env = "CHOMP_STATE_SHM", default_value = DEFAULT_STATE_SHM)]
    state_shm: String,

    #[arg(long, global = true, env = "CHOMP_SYNC_SHM", default_value = DEFAULT_SYNC_SHM)]
    sync_shm: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create both regions for an empty board, or report existing ones.
    Init { width: u16, height: u16 },
    /// Print the header, agents and semaphore values of a running game.
    Info,
    /// Unlink both regions.
    Destroy,
}

fn print_sync(sync: &SyncBlock) -> io::Result<()> {
    println!(
        "sync: render_request={} render_done={} turnstile={} room={} reader_mutex={} readers={}",
        sync.render_request.value()?,
        sync.render_done.value()?,
        sync.no_starve.value()?,
        sync.writer_lock.value()?,
        sync.reader_mutex.value()?,
        sync.readers(),
    );
    let gates = sync
        .gates
        .iter()
        .map(|g| g.value().map(|v| v.to_string()))
        .collect::<io::Result<Vec<_>>>()?;
    println!("gates: [{}]", gates.join(", "));
    Ok(())
}

fn print_info(names: &ShmNames) -> anyhow::Result<()> {
    let ipc = Ipc::attach(names).context("attaching to the game")?;
    print_sync(ipc.sync())?;

    let world = ipc.read()?;
    println!(
        "state: {}x{} access={:?} finished={} agents={}",
        world.width(),
        world.height(),
        ipc.state_access(),
        world.is_finished(),
        world.agents().len()
    );
    for (slot, agent) in world.agents().iter().enumerate() {
        println!(
            "  [{slot}] {:<16} pid={:<7} pos=({},{}) score={} valid={} invalid={} blocked={}",
            agent.name(),
            agent.pid,
            agent.x,
            agent.y,
            agent.score,
            agent.valid_moves,
            agent.invalid_moves,
            agent.is_blocked()
        );
    }
    drop(world);
    ipc.detach();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let names = ShmNames::new(cli.state_shm, cli.sync_shm);

    match cli.command {
        Command::Init { width, height } => {
            let (ipc, existed) = Ipc::create(&names, width, height)
                .with_context(|| format!("creating {} and {}", names.state, names.sync))?;
            let (width, height) = ipc.dimensions();
            info!(
                state = %names.state,
                sync = %names.sync,
                width,
                height,
                existed,
                "regions ready"
            );
            ipc.detach();
        }
        Command::Info => print_info(&names)?,
        Command::Destroy => {
            Ipc::destroy(&names).context("unlinking regions")?;
            info!(state = %names.state, sync = %names.sync, "regions removed");
        }
    }
    Ok(())
}
