use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything a worker call can fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request, rejected before the engine is touched.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Conflict(#[from] StateConflict),

    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("format error: {0}")]
    Format(#[from] FormatError),
}

/// The engine refused a call because of its current state. Engine state is
/// unchanged when one of these is returned.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum StateConflict {
    #[error("worker is currently doing a calculation")]
    AlreadyComputing,
    #[error("calculations already paused")]
    AlreadyPaused,
    #[error("calculations aren't paused")]
    NotPaused,
    #[error("no world data has been loaded")]
    NoDataLoaded,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("expected {expected} ';'-separated sections, found {found}")]
    Sections { expected: usize, found: usize },

    #[error("expected {expected} header fields, found {found}")]
    HeaderFields { expected: usize, found: usize },

    #[error("invalid {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid { width: usize, height: usize },

    #[error("cell list must end with ','")]
    MissingTerminator,

    #[error("expected {expected} cells, found {found}")]
    CellCount { expected: usize, found: usize },

    #[error("invalid cell code {0:?}, expected 0 or 255")]
    CellCode(String),

    #[error("image: {0}")]
    Image(String),

    /// A format error reported by the remote side.
    #[error("{0}")]
    Remote(String),
}

/// Error classification carried in a response envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Protocol,
    AlreadyComputing,
    AlreadyPaused,
    NotPaused,
    NoDataLoaded,
    Transport,
    Format,
}

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Conflict(StateConflict::AlreadyComputing) => ErrorKind::AlreadyComputing,
            Error::Conflict(StateConflict::AlreadyPaused) => ErrorKind::AlreadyPaused,
            Error::Conflict(StateConflict::NotPaused) => ErrorKind::NotPaused,
            Error::Conflict(StateConflict::NoDataLoaded) => ErrorKind::NoDataLoaded,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Format(_) => ErrorKind::Format,
        }
    }

    /// Rebuilds a typed error from the envelope fields.
    pub fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::Protocol => Error::Protocol(message),
            ErrorKind::AlreadyComputing => StateConflict::AlreadyComputing.into(),
            ErrorKind::AlreadyPaused => StateConflict::AlreadyPaused.into(),
            ErrorKind::NotPaused => StateConflict::NotPaused.into(),
            ErrorKind::NoDataLoaded => StateConflict::NoDataLoaded.into(),
            ErrorKind::Transport => Error::Transport(io::Error::other(message)),
            ErrorKind::Format => FormatError::Remote(message).into(),
        }
    }

    /// Message sent alongside the kind. Wrapper prefixes are left off since
    /// the kind already says what family the error belongs to.
    pub fn wire_message(&self) -> String {
        match self {
            Error::Protocol(message) => message.clone(),
            Error::Conflict(conflict) => conflict.to_string(),
            Error::Transport(err) => err.to_string(),
            Error::Format(err) => err.to_string(),
        }
    }

    pub fn conflict(&self) -> Option<StateConflict> {
        match self {
            Error::Conflict(conflict) => Some(*conflict),
            _ => None,
        }
    }

    pub fn connection_closed() -> Self {
        Error::Transport(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "connection closed before a response arrived",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_kinds_rebuild_the_same_error() {
        let errors = [
            Error::protocol("not expecting any data"),
            StateConflict::AlreadyComputing.into(),
            StateConflict::AlreadyPaused.into(),
            StateConflict::NotPaused.into(),
            StateConflict::NoDataLoaded.into(),
            FormatError::MissingTerminator.into(),
        ];
        for err in errors {
            let rebuilt = Error::from_wire(err.kind(), err.wire_message());
            assert_eq!(rebuilt.kind(), err.kind());
            assert_eq!(rebuilt.conflict(), err.conflict());
        }
    }

    #[test]
    fn test_remote_format_keeps_message() {
        let err = Error::from_wire(ErrorKind::Format, "expected 4 cells, found 3".into());
        assert_eq!(err.to_string(), "format error: expected 4 cells, found 3");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::AlreadyComputing).unwrap();
        assert_eq!(json, "\"already_computing\"");
    }
}
