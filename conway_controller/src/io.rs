// io.rs - Where initial boards come from and where finished boards go

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use conway::patterns::{self, Pattern};
use conway::{Cell, FormatError, Grid, Result};
use tracing::debug;

/// Produces the initial board for a run, keyed by `"<width>x<height>"`.
pub trait GridSource: Send + Sync {
    fn read(&self, name: &str) -> Result<Grid>;
}

/// Stores a board under a tag such as `"<width>x<height>x<turn>"`.
pub trait GridSink: Send + Sync {
    fn write(&self, name: &str, grid: &Grid) -> Result<()>;
}

impl<T: GridSource + ?Sized> GridSource for Box<T> {
    fn read(&self, name: &str) -> Result<Grid> {
        (**self).read(name)
    }
}

impl<T: GridSink + ?Sized> GridSink for Box<T> {
    fn write(&self, name: &str, grid: &Grid) -> Result<()> {
        (**self).write(name, grid)
    }
}

/// Binary PGM images: boards are read from `<input>/<name>.pgm` and written
/// to `<output>/<name>.pgm`.
#[derive(Clone, Debug)]
pub struct PgmDirectory {
    input: PathBuf,
    output: PathBuf,
}

impl PgmDirectory {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output.join(format!("{name}.pgm"))
    }

    fn input_path(&self, name: &str) -> PathBuf {
        self.input.join(format!("{name}.pgm"))
    }
}

impl GridSource for PgmDirectory {
    fn read(&self, name: &str) -> Result<Grid> {
        let path = self.input_path(name);
        debug!(path = %path.display(), "reading image");
        let bytes = fs::read(&path)?;
        Ok(decode_pgm(&bytes)?)
    }
}

impl GridSink for PgmDirectory {
    fn write(&self, name: &str, grid: &Grid) -> Result<()> {
        fs::create_dir_all(&self.output)?;
        let path = self.output_path(name);
        debug!(path = %path.display(), "writing image");
        fs::write(&path, encode_pgm(grid))?;
        Ok(())
    }
}

pub fn encode_pgm(grid: &Grid) -> Vec<u8> {
    let mut bytes = format!("P5\n{} {}\n255\n", grid.width(), grid.height()).into_bytes();
    bytes.extend(grid.cells().iter().map(|cell| cell.code()));
    bytes
}

/// Parses a binary PGM whose pixels are all 0 or 255.
pub fn decode_pgm(bytes: &[u8]) -> Result<Grid, FormatError> {
    let mut pos = 0;
    let mut header = [""; 4];
    for slot in &mut header {
        *slot = next_token(bytes, &mut pos)
            .ok_or_else(|| FormatError::Image("truncated header".into()))?;
    }
    let [magic, width, height, maxval] = header;
    if magic != "P5" {
        return Err(FormatError::Image(format!("unsupported magic {magic:?}")));
    }
    if maxval != "255" {
        return Err(FormatError::Image(format!("unsupported maxval {maxval:?}")));
    }
    let width: usize = parse_dimension("width", width)?;
    let height: usize = parse_dimension("height", height)?;

    // Exactly one whitespace byte separates the header from the pixels
    let pixels = bytes.get(pos + 1..).unwrap_or_default();
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| FormatError::Image(format!("{width}x{height} is too large")))?;
    if pixels.len() != expected {
        return Err(FormatError::CellCount {
            expected,
            found: pixels.len(),
        });
    }

    let cells = pixels
        .iter()
        .map(|&code| Cell::from_code(code).ok_or_else(|| FormatError::CellCode(code.to_string())))
        .collect::<Result<Vec<_>, _>>()?;
    Grid::from_cells(width, height, cells)
}

fn next_token<'a>(bytes: &'a [u8], pos: &mut usize) -> Option<&'a str> {
    loop {
        match bytes.get(*pos)? {
            b'#' => {
                while *bytes.get(*pos)? != b'\n' {
                    *pos += 1;
                }
            }
            byte if byte.is_ascii_whitespace() => *pos += 1,
            _ => break,
        }
    }
    let start = *pos;
    while bytes.get(*pos).is_some_and(|byte| !byte.is_ascii_whitespace()) {
        *pos += 1;
    }
    std::str::from_utf8(&bytes[start..*pos]).ok()
}

fn parse_dimension(field: &'static str, value: &str) -> Result<usize, FormatError> {
    value.parse().map_err(|_| FormatError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Builds boards from a named pattern instead of files. Without a pattern
/// the board is filled randomly from `seed`.
#[derive(Clone, Copy)]
pub struct PatternSource {
    pattern: Option<&'static Pattern>,
    seed: u64,
}

impl PatternSource {
    pub fn new(pattern: Option<&'static Pattern>, seed: u64) -> Self {
        Self { pattern, seed }
    }

    /// `"random"` or any name [`patterns::find`] knows.
    pub fn named(name: &str, seed: u64) -> Option<Self> {
        if name.eq_ignore_ascii_case("random") {
            return Some(Self::new(None, seed));
        }
        patterns::find(name).map(|pattern| Self::new(Some(pattern), seed))
    }
}

impl GridSource for PatternSource {
    fn read(&self, name: &str) -> Result<Grid> {
        let (width, height) = parse_size(name)?;
        Ok(match self.pattern {
            Some(pattern) => {
                let mut grid = Grid::new(width, height);
                patterns::apply_pattern(&mut grid, pattern);
                grid
            }
            None => patterns::random_grid(width, height, self.seed),
        })
    }
}

/// Splits `"<width>x<height>"`.
pub fn parse_size(name: &str) -> Result<(usize, usize), FormatError> {
    let (width, height) = name
        .split_once('x')
        .ok_or_else(|| FormatError::Image(format!("expected <width>x<height>, got {name:?}")))?;
    let width = parse_dimension("width", width)?;
    let height = parse_dimension("height", height)?;
    if width == 0 || height == 0 {
        return Err(FormatError::EmptyGrid { width, height });
    }
    Ok((width, height))
}

/// Always hands out the same board.
#[derive(Clone, Debug)]
pub struct FixedSource(pub Grid);

impl GridSource for FixedSource {
    fn read(&self, _name: &str) -> Result<Grid> {
        Ok(self.0.clone())
    }
}

/// Keeps written boards in memory. Clones share the same store.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    written: Arc<Mutex<Vec<(String, Grid)>>>,
}

impl MemorySink {
    pub fn written(&self) -> Vec<(String, Grid)> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<(String, Grid)> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl GridSink for MemorySink {
    fn write(&self, name: &str, grid: &Grid) -> Result<()> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), grid.clone()));
        Ok(())
    }
}
