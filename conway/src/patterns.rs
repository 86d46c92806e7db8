use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::grid::{Cell, Grid};

/// A named starting shape. `cells` are `(row, col)` offsets from the
/// pattern's top-left corner.
pub struct Pattern {
    pub name: &'static str,
    pub cells: &'static [(usize, usize)],
}

impl Pattern {
    /// `(rows, cols)` of the pattern's bounding box.
    pub fn extent(&self) -> (usize, usize) {
        let rows = self.cells.iter().map(|&(r, _)| r + 1).max().unwrap_or(0);
        let cols = self.cells.iter().map(|&(_, c)| c + 1).max().unwrap_or(0);
        (rows, cols)
    }
}

pub const PATTERNS: &[Pattern] = &[
    Pattern {
        name: "Glider",
        cells: &[(0, 1), (1, 2), (2, 0), (2, 1), (2, 2)],
    },
    Pattern {
        name: "Blinker",
        cells: &[(0, 0), (0, 1), (0, 2)],
    },
    Pattern {
        name: "Toad",
        cells: &[(0, 1), (0, 2), (0, 3), (1, 0), (1, 1), (1, 2)],
    },
    Pattern {
        name: "Beacon",
        cells: &[(0, 0), (0, 1), (1, 0), (1, 1), (2, 2), (2, 3), (3, 2), (3, 3)],
    },
    Pattern {
        name: "Pulsar",
        cells: &[
            // Top half
            (0, 2), (0, 3), (0, 4), (0, 8), (0, 9), (0, 10),
            (2, 0), (2, 5), (2, 7), (2, 12),
            (3, 0), (3, 5), (3, 7), (3, 12),
            (4, 0), (4, 5), (4, 7), (4, 12),
            (5, 2), (5, 3), (5, 4), (5, 8), (5, 9), (5, 10),
            // Bottom half (mirrored)
            (7, 2), (7, 3), (7, 4), (7, 8), (7, 9), (7, 10),
            (8, 0), (8, 5), (8, 7), (8, 12),
            (9, 0), (9, 5), (9, 7), (9, 12),
            (10, 0), (10, 5), (10, 7), (10, 12),
            (12, 2), (12, 3), (12, 4), (12, 8), (12, 9), (12, 10),
        ],
    },
    Pattern {
        name: "R-pentomino",
        cells: &[(1, 1), (1, 2), (0, 2), (2, 1), (2, 0)],
    },
    Pattern {
        name: "Gosper Glider Gun",
        cells: &[
            (4, 0), (4, 1), (5, 0), (5, 1),
            (4, 10), (5, 10), (6, 10), (3, 11), (7, 11), (2, 12), (8, 12),
            (2, 13), (8, 13), (5, 14), (3, 15), (7, 15), (4, 16), (5, 16),
            (6, 16), (5, 17), (2, 20), (3, 20), (4, 20), (2, 21), (3, 21),
            (4, 21), (1, 22), (5, 22), (0, 24), (1, 24), (5, 24), (6, 24),
            (2, 34), (3, 34), (2, 35), (3, 35),
        ],
    },
];

/// Looks a pattern up by name, ignoring case, spaces, dashes and underscores.
pub fn find(name: &str) -> Option<&'static Pattern> {
    let wanted = normalize(name);
    PATTERNS.iter().find(|p| normalize(p.name) == wanted)
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Clears the grid and stamps the pattern in the middle. Cells that do not
/// fit wrap around the torus.
pub fn apply_pattern(grid: &mut Grid, pattern: &Pattern) {
    grid.clear();
    if grid.cells().is_empty() {
        return;
    }

    let (rows, cols) = pattern.extent();
    let top = grid.height().saturating_sub(rows) / 2;
    let left = grid.width().saturating_sub(cols) / 2;

    for &(row, col) in pattern.cells {
        let y = (top + row) % grid.height();
        let x = (left + col) % grid.width();
        grid.set(x, y, Cell::Alive);
    }
}

/// Roughly a third of the cells alive, reproducible from `seed`.
pub fn random_grid(width: usize, height: usize, seed: u64) -> Grid {
    let mut grid = Grid::new(width, height);

    // LCG seeded from the hashed seed; about a third of the cells start alive
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    let mut state = hasher.finish();

    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            grid.set(x, y, Cell::from((state >> 33) % 3 == 0));
        }
    }
    grid
}
