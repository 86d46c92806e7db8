//! Shared pieces of the distributed Game of Life: the board model, the step
//! rule, the text codec for board payloads, and the request/response
//! protocol spoken between controller and worker.

pub mod codec;
pub mod error;
pub mod grid;
pub mod patterns;
pub mod rpc;
pub mod step;

pub use error::{Error, ErrorKind, FormatError, Result, StateConflict};
pub use grid::{Cell, Grid, SimulationParams, Snapshot};
pub use rpc::{Client, Method, PendingCall};
pub use step::{ConwayStep, StepFunction};

/// Where the worker listens unless told otherwise.
pub const DEFAULT_WORKER_ADDR: &str = "127.0.0.1:8030";
