//! Borrowed views over a header and its grid.
//!
//! The same views are handed out by the shared-memory lock guards and by the
//! heap-backed [`WorldBuf`], so game rules never care where the bytes live.

use crate::cell::Cell;
use crate::direction::Direction;
use crate::layout::{AgentRecord, StateHeader};

/// Read-only view of the world.
#[derive(Clone, Copy)]
pub struct World<'a> {
    header: &'a StateHeader,
    cells: &'a [i32],
}

/// Mutable view of the world.
pub struct WorldMut<'a> {
    header: &'a mut StateHeader,
    cells: &'a mut [i32],
}

/// Heap-allocated world, used by tools and tests that need a world without
/// a shared region behind it.
pub struct WorldBuf {
    header: Box<StateHeader>,
    cells: Vec<i32>,
}

#[inline]
fn index(width: u16, x: u16, y: u16) -> usize {
    y as usize * width as usize + x as usize
}

impl<'a> World<'a> {
    /// `cells` must hold exactly `width * height` entries.
    pub fn new(header: &'a StateHeader, cells: &'a [i32]) -> Self {
        debug_assert_eq!(cells.len(), header.cell_count());
        Self { header, cells }
    }

    #[inline]
    pub fn header(&self) -> &'a StateHeader {
        self.header
    }

    #[inline]
    pub fn width(&self) -> u16 {
        self.header.width
    }

    #[inline]
    pub fn height(&self) -> u16 {
        self.header.height
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.header.is_finished()
    }

    /// Records of the configured agents only.
    #[inline]
    pub fn agents(&self) -> &'a [AgentRecord] {
        &self.header.agents[..self.header.agent_count()]
    }

    #[inline]
    pub fn agent(&self, slot: usize) -> Option<&'a AgentRecord> {
        self.agents().get(slot)
    }

    #[inline]
    pub fn raw_cells(&self) -> &'a [i32] {
        self.cells
    }

    #[inline]
    pub fn cell(&self, x: u16, y: u16) -> Option<Cell> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        Some(Cell::decode(self.cells[index(self.width(), x, y)]))
    }

    /// Destination of one step from `(x, y)`, `None` when it leaves the board.
    pub fn step(&self, x: u16, y: u16, dir: Direction) -> Option<(u16, u16)> {
        let (dx, dy) = dir.offset();
        let nx = x as i32 + dx;
        let ny = y as i32 + dy;
        if nx < 0 || ny < 0 || nx >= self.width() as i32 || ny >= self.height() as i32 {
            return None;
        }
        Some((nx as u16, ny as u16))
    }

    /// Whether any of the eight neighbours of `(x, y)` is still unclaimed.
    pub fn has_free_neighbor(&self, x: u16, y: u16) -> bool {
        Direction::ALL.iter().any(|&dir| {
            self.step(x, y, dir)
                .and_then(|(nx, ny)| self.cell(nx, ny))
                .is_some_and(Cell::is_free)
        })
    }

    /// Every cell with its coordinates, row by row.
    pub fn cells(self) -> impl Iterator<Item = (u16, u16, Cell)> + 'a {
        let width = self.width();
        self.cells.iter().enumerate().map(move |(i, &raw)| {
            let x = (i % width as usize) as u16;
            let y = (i / width as usize) as u16;
            (x, y, Cell::decode(raw))
        })
    }
}

impl<'a> WorldMut<'a> {
    pub fn new(header: &'a mut StateHeader, cells: &'a mut [i32]) -> Self {
        debug_assert_eq!(cells.len(), header.cell_count());
        Self { header, cells }
    }

    /// Reborrow as a read-only view.
    #[inline]
    pub fn as_world(&self) -> World<'_> {
        World {
            header: &*self.header,
            cells: &*self.cells,
        }
    }

    #[inline]
    pub fn header_mut(&mut self) -> &mut StateHeader {
        &mut *self.header
    }

    #[inline]
    pub fn agent_mut(&mut self, slot: usize) -> Option<&mut AgentRecord> {
        let count = self.header.agent_count();
        self.header.agents[..count].get_mut(slot)
    }

    #[inline]
    pub fn set_finished(&mut self) {
        self.header.set_finished();
    }

    /// Overwrite one cell. Out-of-board coordinates are ignored and reported
    /// as `false`.
    pub fn set_cell(&mut self, x: u16, y: u16, cell: Cell) -> bool {
        if x >= self.header.width || y >= self.header.height {
            return false;
        }
        self.cells[index(self.header.width, x, y)] = cell.encode();
        true
    }

    #[inline]
    pub fn raw_cells_mut(&mut self) -> &mut [i32] {
        &mut *self.cells
    }
}

impl WorldBuf {
    /// Zeroed header with the given dimensions and an all-zero grid.
    pub fn new(width: u16, height: u16) -> Self {
        let mut header = Box::new(StateHeader::default());
        header.width = width;
        header.height = height;
        let cells = vec![0; width as usize * height as usize];
        Self { header, cells }
    }

    pub fn view(&self) -> World<'_> {
        World::new(&self.header, &self.cells)
    }

    pub fn view_mut(&mut self) -> WorldMut<'_> {
        WorldMut::new(&mut self.header, &mut self.cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_carries_dimensions_only() {
        let buf = WorldBuf::new(12, 10);
        let world = buf.view();
        assert_eq!((world.width(), world.height()), (12, 10));
        assert_eq!(world.raw_cells().len(), 120);
        assert!(!world.is_finished());
        assert!(world.agents().is_empty());
    }

    #[test]
    fn step_stays_on_the_board() {
        let buf = WorldBuf::new(10, 10);
        let world = buf.view();
        assert_eq!(world.step(0, 0, Direction::Up), None);
        assert_eq!(world.step(0, 0, Direction::Left), None);
        assert_eq!(world.step(0, 0, Direction::DownRight), Some((1, 1)));
        assert_eq!(world.step(9, 9, Direction::Right), None);
        assert_eq!(world.step(9, 9, Direction::UpLeft), Some((8, 8)));
    }

    #[test]
    fn free_neighbour_detection() {
        let mut buf = WorldBuf::new(10, 10);
        {
            let mut world = buf.view_mut();
            world.raw_cells_mut().fill(Cell::Body(1).encode());
            world.set_cell(5, 5, Cell::Head(1));
        }
        assert!(!buf.view().has_free_neighbor(5, 5));

        buf.view_mut().set_cell(6, 4, Cell::Free(3));
        assert!(buf.view().has_free_neighbor(5, 5));
        // (6,4) is not adjacent to (3,3)
        assert!(!buf.view().has_free_neighbor(3, 3));
    }

    #[test]
    fn cells_are_row_major() {
        let mut buf = WorldBuf::new(10, 10);
        buf.view_mut().set_cell(3, 2, Cell::Free(7));
        assert_eq!(buf.view().raw_cells()[2 * 10 + 3], 7);
        let found: Vec<_> = buf
            .view()
            .cells()
            .filter(|(_, _, c)| c.is_free())
            .collect();
        assert_eq!(found, vec![(3, 2, Cell::Free(7))]);
    }

    #[test]
    fn out_of_board_writes_are_ignored() {
        let mut buf = WorldBuf::new(10, 10);
        assert!(!buf.view_mut().set_cell(10, 0, Cell::Free(1)));
        assert_eq!(buf.view().cell(10, 0), None);
    }

    #[test]
    fn agents_view_only_covers_configured_slots() {
        let mut buf = WorldBuf::new(10, 10);
        buf.view_mut().header_mut().num_agents = 2;
        assert_eq!(buf.view().agents().len(), 2);
        assert!(buf.view_mut().agent_mut(2).is_none());
    }
}
