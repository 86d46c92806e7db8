//! Worker side of the distributed Game of Life. Holds the authoritative
//! board, runs the turn loop, and answers control and status calls from a
//! controller over TCP.

pub mod engine;
pub mod server;
pub mod service;

pub use engine::{Engine, Phase, Run};
pub use server::{serve, serve_connection};
pub use service::{Call, ControlService};
