//! Greedy reference agent.
//!
//! On every admission it looks at its eight neighbours under the reader role
//! and heads for the largest free reward, breaking ties at random. It writes
//! exactly one direction byte per admission and leaves when the game is
//! finished, when it has been blocked, or when the orchestrator stops
//! reading its pipe.

use anyhow::{Context, bail};
use chomp_icc::{AGENT_SLOT_ENV, Ipc, ShmNames};
use chomp_state::{Direction, World};
use rand::Rng;
use rand::seq::IndexedRandom;
use std::io::{self, Write};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Best free neighbour of `slot`'s head, `None` when there is nothing left
/// to take or the slot is unknown.
fn choose(world: World<'_>, slot: usize, rng: &mut impl Rng) -> Option<Direction> {
    let (x, y) = world.agent(slot)?.position();
    let options: Vec<(Direction, u8)> = Direction::ALL
        .iter()
        .filter_map(|&dir| {
            let (nx, ny) = world.step(x, y, dir)?;
            let reward = world.cell(nx, ny)?.reward()?;
            Some((dir, reward))
        })
        .collect();
    let best = options.iter().map(|&(_, r)| r).max()?;
    let top: Vec<Direction> = options
        .iter()
        .filter(|&&(_, r)| r == best)
        .map(|&(dir, _)| dir)
        .collect();
    top.choose(rng).copied()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let slot: usize = std::env::var(AGENT_SLOT_ENV)
        .with_context(|| format!("{AGENT_SLOT_ENV} is not set"))?
        .parse()
        .with_context(|| format!("{AGENT_SLOT_ENV} is not a slot number"))?;
    let names = ShmNames::from_env();
    let ipc = Ipc::attach(&names).with_context(|| format!("attaching to {}", names.state))?;
    let sync = ipc.sync();
    if ipc.read()?.agent(slot).is_none() {
        bail!("slot {slot} is not part of this game");
    }

    let mut rng = rand::rng();
    let mut stdout = io::stdout().lock();
    let mut sent = 0u64;

    loop {
        sync.await_admission(slot).context("waiting for admission")?;
        let choice = {
            let world = ipc.read().context("entering reader role")?;
            let me = world.agent(slot);
            if world.is_finished() || me.is_none_or(|a| a.is_blocked()) {
                break;
            }
            choose(*world, slot, &mut rng)
        };
        // nothing free around us: any byte is an invalid move and keeps the turn going
        let dir = choice.unwrap_or_else(|| Direction::ALL[rng.random_range(0..Direction::ALL.len())]);

        match stdout.write_all(&[dir.as_byte()]).and_then(|()| stdout.flush()) {
            Ok(()) => sent += 1,
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!("orchestrator closed the pipe");
                break;
            }
            Err(e) => return Err(e).context("writing move"),
        }
    }

    info!(slot, sent, "agent done");
    ipc.detach();
    Ok(())
}
