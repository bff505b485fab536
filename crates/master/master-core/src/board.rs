//! Board setup: reward grid and starting positions.

use chomp_state::{Cell, MAX_AGENTS, WorldMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Rewards lie in `1..=MAX_REWARD`.
pub const MAX_REWARD: u8 = 9;

/// Fill every cell with a reward, row by row. Same seed, same grid.
pub fn generate_rewards(world: &mut WorldMut<'_>, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    for cell in world.raw_cells_mut() {
        *cell = Cell::Free(rng.random_range(1..=MAX_REWARD)).encode();
    }
}

/// Starting points for `count` agents, spread over an `R x C` grid of
/// evenly spaced interior points, where `R` is the smallest integer with
/// `R * R >= count` and `C = ceil(count / R)`.
pub fn placement(width: u16, height: u16, count: usize) -> Vec<(u16, u16)> {
    if count == 0 || width == 0 || height == 0 {
        return Vec::new();
    }
    let rows = (1..=count).find(|r| r * r >= count).unwrap_or(count);
    let cols = count.div_ceil(rows);
    let (w, h) = (width as usize, height as usize);

    (0..count)
        .map(|i| {
            let (r, c) = (i / cols, i % cols);
            let x = ((2 * c + 1) * w) / (2 * cols);
            let y = ((2 * r + 1) * h) / (2 * rows);
            (x.min(w - 1) as u16, y.min(h - 1) as u16)
        })
        .collect()
}

/// Prepare a fresh game: rewards from `seed`, one record per name, each agent
/// standing on its own head cell. Names beyond [`MAX_AGENTS`] are ignored.
///
/// Returns the starting positions, indexed by slot.
pub fn setup_world(world: &mut WorldMut<'_>, seed: u64, names: &[&str]) -> Vec<(u16, u16)> {
    let names = &names[..names.len().min(MAX_AGENTS)];
    generate_rewards(world, seed);

    let (width, height) = {
        let view = world.as_world();
        (view.width(), view.height())
    };
    let positions = placement(width, height, names.len());

    world.header_mut().num_agents = names.len() as u32;
    for (slot, (name, &(x, y))) in names.iter().zip(&positions).enumerate() {
        world.set_cell(x, y, Cell::Head(slot as u8));
        if let Some(agent) = world.agent_mut(slot) {
            *agent = Default::default();
            agent.set_name(name);
            agent.x = x;
            agent.y = y;
        }
    }
    positions
}
