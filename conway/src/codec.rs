//! Text payloads carried inside request and response envelopes.
//!
//! ```text
//! grid     := height "," width ";" cells
//! initial  := height "," width "," threads "," turns ";" cells
//! snapshot := turn ";" grid
//! count    := turn "," alive
//! cells    := (code ",")*          -- exactly height*width entries, row-major
//! code     := "0" | "255"
//! ```
//!
//! Decoding is strict. Any deviation from the grammar is a [`FormatError`];
//! nothing is repaired or defaulted.

use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::FormatError;
use crate::grid::{Cell, Grid, SimulationParams, Snapshot};

/// Body of a successful control call that has nothing else to say.
pub const ACK: &str = "received";

pub fn encode_grid(grid: &Grid) -> String {
    let mut out = String::with_capacity(16 + grid.cells().len() * 4);
    let _ = write!(out, "{},{};", grid.height(), grid.width());
    write_cells(&mut out, grid);
    out
}

pub fn decode_grid(s: &str) -> Result<Grid, FormatError> {
    let [header, cells] = sections::<2>(s)?;
    let [height, width] = fields::<2>(header)?;
    decode_cells(
        parse_number("width", width)?,
        parse_number("height", height)?,
        cells,
    )
}

/// The header always carries the run's size from `params`; a board of any
/// other size fails to decode on the far side.
pub fn encode_initial(grid: &Grid, params: &SimulationParams) -> String {
    let mut out = String::with_capacity(32 + grid.cells().len() * 4);
    let _ = write!(
        out,
        "{},{},{},{};",
        params.height,
        params.width,
        params.threads,
        params.total_turns
    );
    write_cells(&mut out, grid);
    out
}

pub fn decode_initial(s: &str) -> Result<(Grid, SimulationParams), FormatError> {
    let [header, cells] = sections::<2>(s)?;
    let [height, width, threads, turns] = fields::<4>(header)?;

    let threads: usize = parse_number("threads", threads)?;
    if threads == 0 {
        return Err(FormatError::InvalidNumber {
            field: "threads",
            value: "0".into(),
        });
    }

    let grid = decode_cells(
        parse_number("width", width)?,
        parse_number("height", height)?,
        cells,
    )?;
    let params = SimulationParams {
        width: grid.width(),
        height: grid.height(),
        total_turns: parse_number("turns", turns)?,
        threads,
    };
    Ok((grid, params))
}

pub fn encode_snapshot(snapshot: &Snapshot) -> String {
    format!("{};{}", snapshot.turn, encode_grid(&snapshot.grid))
}

pub fn decode_snapshot(s: &str) -> Result<Snapshot, FormatError> {
    let [turn, header, cells] = sections::<3>(s)?;
    let [height, width] = fields::<2>(header)?;
    let grid = decode_cells(
        parse_number("width", width)?,
        parse_number("height", height)?,
        cells,
    )?;
    Ok(Snapshot::new(parse_number("turn", turn)?, grid))
}

pub fn encode_cell_count(turn: u64, alive: usize) -> String {
    format!("{turn},{alive}")
}

pub fn decode_cell_count(s: &str) -> Result<(u64, usize), FormatError> {
    let [turn, alive] = fields::<2>(s)?;
    Ok((parse_number("turn", turn)?, parse_number("alive", alive)?))
}

pub fn decode_turns(s: &str) -> Result<u64, FormatError> {
    parse_number("turns", s)
}

fn write_cells(out: &mut String, grid: &Grid) {
    for cell in grid.cells() {
        let _ = write!(out, "{},", cell.code());
    }
}

fn decode_cells(width: usize, height: usize, section: &str) -> Result<Grid, FormatError> {
    if width == 0 || height == 0 {
        return Err(FormatError::EmptyGrid { width, height });
    }
    let expected = width
        .checked_mul(height)
        .ok_or_else(|| FormatError::InvalidNumber {
            field: "height",
            value: height.to_string(),
        })?;

    let body = section
        .strip_suffix(',')
        .ok_or(FormatError::MissingTerminator)?;
    let found = body.split(',').count();
    if found != expected {
        return Err(FormatError::CellCount { expected, found });
    }

    let cells = body
        .split(',')
        .map(|code| {
            code.parse::<u8>()
                .ok()
                .and_then(Cell::from_code)
                .ok_or_else(|| FormatError::CellCode(code.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Grid::from_cells(width, height, cells)
}

fn sections<const N: usize>(s: &str) -> Result<[&str; N], FormatError> {
    let parts: Vec<&str> = s.split(';').collect();
    let found = parts.len();
    parts
        .try_into()
        .map_err(|_| FormatError::Sections { expected: N, found })
}

fn fields<const N: usize>(s: &str) -> Result<[&str; N], FormatError> {
    let parts: Vec<&str> = s.split(',').collect();
    let found = parts.len();
    parts
        .try_into()
        .map_err(|_| FormatError::HeaderFields { expected: N, found })
}

fn parse_number<T: FromStr>(field: &'static str, value: &str) -> Result<T, FormatError> {
    value.parse().map_err(|_| FormatError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}
