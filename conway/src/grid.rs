// grid.rs - Grid types for Conway's Game of Life on a torus

use std::sync::Arc;

use crate::error::FormatError;

pub const DEFAULT_THREADS: usize = 1;

/// State of a single cell. On the wire a live cell is `255` and a dead one `0`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Cell {
    #[default]
    Dead,
    Alive,
}

impl Cell {
    pub const DEAD_CODE: u8 = 0;
    pub const ALIVE_CODE: u8 = 255;

    #[inline]
    pub fn is_alive(self) -> bool {
        self == Cell::Alive
    }

    #[inline]
    pub fn code(self) -> u8 {
        match self {
            Cell::Alive => Self::ALIVE_CODE,
            Cell::Dead => Self::DEAD_CODE,
        }
    }

    pub fn from_code(code: u8) -> Option<Cell> {
        match code {
            Self::ALIVE_CODE => Some(Cell::Alive),
            Self::DEAD_CODE => Some(Cell::Dead),
            _ => None,
        }
    }
}

impl From<bool> for Cell {
    fn from(alive: bool) -> Self {
        if alive { Cell::Alive } else { Cell::Dead }
    }
}

/// Rectangular board, stored row-major. Adjacency wraps at every edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Grid {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Grid {
    /// An all-dead board.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::Dead; width * height],
        }
    }

    pub fn from_cells(width: usize, height: usize, cells: Vec<Cell>) -> Result<Self, FormatError> {
        if width == 0 || height == 0 {
            return Err(FormatError::EmptyGrid { width, height });
        }
        if cells.len() != width * height {
            return Err(FormatError::CellCount {
                expected: width * height,
                found: cells.len(),
            });
        }
        Ok(Self { width, height, cells })
    }

    /// Board of the given size with the listed `(x, y)` cells alive.
    /// Coordinates outside the board wrap around. A zero-sized board has no
    /// cells to set, so the list is ignored.
    pub fn with_alive(width: usize, height: usize, alive: &[(usize, usize)]) -> Self {
        let mut grid = Self::new(width, height);
        if grid.cells.is_empty() {
            return grid;
        }
        for &(x, y) in alive {
            grid.set(x % width, y % height, Cell::Alive);
        }
        grid
    }

    // Rows produced by the step function are always full width
    pub(crate) fn from_rows_unchecked(width: usize, height: usize, cells: Vec<Cell>) -> Self {
        debug_assert_eq!(cells.len(), width * height);
        Self { width, height, cells }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Cell {
        self.cells[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, cell: Cell) {
        self.cells[y * self.width + x] = cell;
    }

    pub fn row(&self, y: usize) -> &[Cell] {
        &self.cells[y * self.width..(y + 1) * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width.max(1))
    }

    pub fn alive_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_alive()).count()
    }

    /// `(x, y)` of every live cell, in row-major order.
    pub fn alive_cells(&self) -> Vec<(usize, usize)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_alive())
            .map(|(i, _)| (i % self.width, i / self.width))
            .collect()
    }

    pub fn clear(&mut self) {
        self.cells.fill(Cell::Dead);
    }
}

/// Fixed for the lifetime of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimulationParams {
    pub width: usize,
    pub height: usize,
    pub total_turns: u64,
    pub threads: usize,
}

impl SimulationParams {
    pub fn new(width: usize, height: usize, total_turns: u64) -> Self {
        Self {
            width,
            height,
            total_turns,
            threads: DEFAULT_THREADS,
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Name the image reader uses for the initial board, `"<width>x<height>"`.
    pub fn image_name(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Name the image writer uses for a board at `turn`, `"<width>x<height>x<turn>"`.
    pub fn output_name(&self, turn: u64) -> String {
        format!("{}x{}x{}", self.width, self.height, turn)
    }
}

/// Point-in-time copy of the board and its turn. The engine never mutates a
/// published grid, so sharing it behind an `Arc` keeps the copy decoupled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub turn: u64,
    pub grid: Arc<Grid>,
}

impl Snapshot {
    pub fn new(turn: u64, grid: impl Into<Arc<Grid>>) -> Self {
        Self {
            turn,
            grid: grid.into(),
        }
    }

    pub fn alive_count(&self) -> usize {
        self.grid.alive_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_codes() {
        assert_eq!(Cell::Alive.code(), 255);
        assert_eq!(Cell::Dead.code(), 0);
        assert_eq!(Cell::from_code(255), Some(Cell::Alive));
        assert_eq!(Cell::from_code(0), Some(Cell::Dead));
        assert_eq!(Cell::from_code(1), None);
    }

    #[test]
    fn test_row_major_layout() {
        let grid = Grid::with_alive(3, 2, &[(2, 0), (0, 1)]);
        assert_eq!(grid.row(0), &[Cell::Dead, Cell::Dead, Cell::Alive]);
        assert_eq!(grid.row(1), &[Cell::Alive, Cell::Dead, Cell::Dead]);
        assert_eq!(grid.rows().count(), 2);
        assert_eq!(grid.alive_cells(), vec![(2, 0), (0, 1)]);
        assert_eq!(grid.alive_count(), 2);
    }

    #[test]
    fn test_from_cells_rejects_bad_shapes() {
        assert_eq!(
            Grid::from_cells(2, 2, vec![Cell::Dead; 3]),
            Err(FormatError::CellCount { expected: 4, found: 3 })
        );
        assert_eq!(
            Grid::from_cells(0, 2, vec![]),
            Err(FormatError::EmptyGrid { width: 0, height: 2 })
        );
    }

    #[test]
    fn test_with_alive_wraps_coordinates() {
        let grid = Grid::with_alive(4, 4, &[(5, 6)]);
        assert!(grid.get(1, 2).is_alive());
    }

    #[test]
    fn test_set_and_clear() {
        let mut grid = Grid::new(2, 2);
        grid.set(1, 1, Cell::Alive);
        assert!(grid.get(1, 1).is_alive());
        grid.set(0, 0, Cell::Alive);
        grid.clear();
        assert_eq!(grid.alive_count(), 0);
    }

    #[test]
    fn test_with_alive_on_zero_sized_board() {
        let grid = Grid::with_alive(0, 3, &[(1, 1)]);
        assert_eq!((grid.width(), grid.height()), (0, 3));
        assert!(grid.cells().is_empty());
        assert!(Grid::with_alive(4, 0, &[(0, 0)]).alive_cells().is_empty());
    }

    #[test]
    fn test_params_names() {
        let params = SimulationParams::new(512, 256, 100);
        assert_eq!(params.image_name(), "512x256");
        assert_eq!(params.output_name(42), "512x256x42");
        assert_eq!(params.with_threads(0).threads, 1);
    }
}
