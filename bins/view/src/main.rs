//! Plain-text renderer.
//!
//! Waits for a frame request, copies the board out under the reader role,
//! prints it and reports the frame as done. Exits after drawing a finished
//! game.

use anyhow::Context;
use chomp_icc::{Ipc, ShmNames};
use chomp_state::{Cell, World};
use std::fmt::Write as _;
use std::io::{self, IsTerminal, Write};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CLEAR: &str = "\x1b[2J\x1b[H";

fn glyph(cell: Cell) -> char {
    match cell {
        Cell::Free(reward) => char::from(b'0' + reward.min(9)),
        Cell::Head(owner) => char::from(b'A' + owner % 26),
        Cell::Body(owner) => char::from(b'a' + owner % 26),
        Cell::Eliminated(_) => '#',
    }
}

/// Board followed by the scoreboard.
fn draw(world: World<'_>) -> String {
    let mut out = String::new();
    let width = world.width();
    for (x, _, cell) in world.cells() {
        out.push(glyph(cell));
        out.push(if x + 1 == width { '\n' } else { ' ' });
    }
    out.push('\n');
    for (slot, agent) in world.agents().iter().enumerate() {
        let _ = writeln!(
            out,
            "{} {:<16} score {:>5}  valid {:>4}  invalid {:>4}{}",
            char::from(b'A' + slot as u8),
            agent.name(),
            agent.score,
            agent.valid_moves,
            agent.invalid_moves,
            if agent.is_blocked() { "  blocked" } else { "" }
        );
    }
    if world.is_finished() {
        out.push_str("game over\n");
    }
    out
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let names = ShmNames::from_env();
    let ipc = Ipc::attach(&names).with_context(|| format!("attaching to {}", names.state))?;
    let sync = ipc.sync();

    let expected: Vec<u16> = std::env::args().skip(1).filter_map(|a| a.parse().ok()).collect();
    if let &[w, h] = expected.as_slice() {
        if (w, h) != ipc.dimensions() {
            warn!(args = ?(w, h), region = ?ipc.dimensions(), "board size mismatch");
        }
    }

    let mut stdout = io::stdout().lock();
    let clear = stdout.is_terminal();
    let mut frames = 0u64;

    loop {
        sync.await_render_request().context("waiting for a frame request")?;
        let (frame, finished) = {
            let world = ipc.read().context("entering reader role")?;
            (draw(*world), world.is_finished())
        };

        if clear {
            stdout.write_all(CLEAR.as_bytes())?;
        }
        stdout.write_all(frame.as_bytes())?;
        stdout.flush()?;
        frames += 1;
        debug!(frames, "frame drawn");

        sync.render_done().context("signalling frame done")?;
        if finished {
            break;
        }
    }

    info!(frames, "game finished");
    ipc.detach();
    Ok(())
}
