// step.rs - One generation of Conway's rules over a toroidal grid

use std::ops::Range;

use crate::grid::{Cell, Grid};

/// Advances a whole board by one turn. Implementations must be pure: the
/// engine calls this outside its lock and relies on it not touching shared
/// state. `threads` is the parallelism the run was configured with.
pub trait StepFunction: Send + Sync {
    fn step(&self, grid: &Grid, threads: usize) -> Grid;
}

/// Standard B3/S23 rule. With more than one thread the board is cut into
/// horizontal bands, each band computed on its own scoped thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConwayStep;

impl StepFunction for ConwayStep {
    fn step(&self, grid: &Grid, threads: usize) -> Grid {
        let (width, height) = (grid.width(), grid.height());
        let bands = threads.min(height).max(1);

        let cells = if bands == 1 {
            process_band(grid, 0..height)
        } else {
            let band_height = height.div_ceil(bands);
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..height)
                    .step_by(band_height)
                    .map(|start| {
                        let rows = start..(start + band_height).min(height);
                        scope.spawn(move || process_band(grid, rows))
                    })
                    .collect();

                // Bands are joined in spawn order, so rows stay in place
                let mut cells = Vec::with_capacity(width * height);
                for handle in handles {
                    match handle.join() {
                        Ok(band) => cells.extend(band),
                        Err(panic) => std::panic::resume_unwind(panic),
                    }
                }
                cells
            })
        };

        Grid::from_rows_unchecked(width, height, cells)
    }
}

fn process_band(grid: &Grid, rows: Range<usize>) -> Vec<Cell> {
    let mut band = Vec::with_capacity(rows.len() * grid.width());
    for y in rows {
        band.extend(process_row(grid, y));
    }
    band
}

/// Next state of every cell in row `y`.
pub fn process_row(grid: &Grid, y: usize) -> Vec<Cell> {
    (0..grid.width())
        .map(|x| {
            let count = alive_neighbours(grid, x, y);
            Cell::from(next_state(grid.get(x, y).is_alive(), count))
        })
        .collect()
}

#[inline]
fn next_state(alive: bool, count: u8) -> bool {
    match (alive, count) {
        (true, 2) | (true, 3) => true, // Survival
        (false, 3) => true,            // Birth
        _ => false,                    // Death or stays dead
    }
}

/// Live cells among the eight wrapped neighbours of `(x, y)`. On boards
/// narrower than three cells a neighbour can be the cell itself; that
/// position is skipped.
pub fn alive_neighbours(grid: &Grid, x: usize, y: usize) -> u8 {
    let (width, height) = (grid.width(), grid.height());
    let xs = [(x + width - 1) % width, x, (x + 1) % width];
    let ys = [(y + height - 1) % height, y, (y + 1) % height];

    let mut count = 0;
    for &ny in &ys {
        for &nx in &xs {
            if (nx, ny) != (x, y) && grid.get(nx, ny).is_alive() {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns;

    fn blinker_horizontal() -> Grid {
        Grid::with_alive(4, 4, &[(0, 1), (1, 1), (2, 1)])
    }

    fn blinker_vertical() -> Grid {
        Grid::with_alive(4, 4, &[(1, 0), (1, 1), (1, 2)])
    }

    #[test]
    fn test_blinker_oscillates() {
        let once = ConwayStep.step(&blinker_horizontal(), 1);
        assert_eq!(once, blinker_vertical());
        assert_eq!(once.alive_count(), 3);

        let twice = ConwayStep.step(&once, 1);
        assert_eq!(twice, blinker_horizontal());
    }

    #[test]
    fn test_neighbours_wrap_at_corners() {
        let grid = Grid::with_alive(5, 5, &[(4, 4), (4, 0), (0, 4)]);
        assert_eq!(alive_neighbours(&grid, 0, 0), 3);
        // The dead corner has exactly three live neighbours, so it is born
        assert!(ConwayStep.step(&grid, 1).get(0, 0).is_alive());
    }

    #[test]
    fn test_block_is_still_life() {
        let block = Grid::with_alive(6, 6, &[(2, 2), (3, 2), (2, 3), (3, 3)]);
        assert_eq!(ConwayStep.step(&block, 1), block);
    }

    #[test]
    fn test_glider_crosses_torus() {
        // A glider moves one cell diagonally every four turns; after 4*8
        // turns on an 8x8 torus it is back where it started.
        let mut grid = Grid::new(8, 8);
        patterns::apply_pattern(&mut grid, patterns::find("glider").unwrap());
        let start = grid.clone();

        for _ in 0..32 {
            grid = ConwayStep.step(&grid, 1);
            assert_eq!(grid.alive_count(), 5);
        }
        assert_eq!(grid, start);
    }

    #[test]
    fn test_banded_step_matches_single_thread() {
        let grid = patterns::random_grid(37, 23, 7);
        let single = ConwayStep.step(&grid, 1);
        for threads in [0, 2, 3, 8, 64] {
            assert_eq!(ConwayStep.step(&grid, threads), single, "threads = {threads}");
        }
    }

    #[test]
    fn test_rules() {
        assert!(next_state(true, 2));
        assert!(next_state(true, 3));
        assert!(next_state(false, 3));
        assert!(!next_state(true, 1));
        assert!(!next_state(true, 4));
        assert!(!next_state(false, 2));
    }
}
