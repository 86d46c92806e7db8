//! Controller side of the distributed Game of Life: reads the initial
//! board, drives a run on a remote worker and turns what happens into
//! [`Event`]s for whoever is watching.

pub mod driver;
pub mod events;
pub mod io;

pub use driver::{Controller, DEFAULT_TICK, Exit, SessionConfig, SessionError, SessionOutcome};
pub use events::{Command, Event, State};
pub use io::{FixedSource, GridSink, GridSource, MemorySink, PatternSource, PgmDirectory};

pub const DEFAULT_TURNS: u64 = 100;
pub const DEFAULT_IMAGE_DIR: &str = "images";
pub const DEFAULT_OUTPUT_DIR: &str = "out";
