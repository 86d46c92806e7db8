use std::fmt;

/// What the session reports to whoever is watching it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Periodic progress from the worker.
    AliveCellsCount { turn: u64, count: usize },
    /// A board was written out under `filename`.
    ImageOutputComplete { turn: u64, filename: String },
    StateChange { turn: u64, state: State },
    /// The run is over; `alive` lists `(x, y)` of every live cell.
    FinalTurnComplete { turn: u64, alive: Vec<(usize, usize)> },
}

impl Event {
    pub fn turn(&self) -> u64 {
        match self {
            Event::AliveCellsCount { turn, .. }
            | Event::ImageOutputComplete { turn, .. }
            | Event::StateChange { turn, .. }
            | Event::FinalTurnComplete { turn, .. } => *turn,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::AliveCellsCount { turn, count } => {
                write!(f, "turn {turn}: {count} alive cells")
            }
            Event::ImageOutputComplete { turn, filename } => {
                write!(f, "turn {turn}: wrote {filename}")
            }
            Event::StateChange { turn, state } => write!(f, "turn {turn}: {state}"),
            Event::FinalTurnComplete { turn, alive } => {
                write!(f, "turn {turn}: finished with {} alive cells", alive.len())
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Executing,
    Paused,
    Quitting,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Executing => "Executing",
            State::Paused => "Paused",
            State::Quitting => "Quitting",
        })
    }
}

/// Interactive commands, one per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// `p`: pause, or resume if already paused.
    TogglePause,
    /// `s`: write the current board out.
    Snapshot,
    /// `q`: stop and leave without writing the final board.
    GracefulStop,
    /// `k`: stop and write the final board.
    ForcefulStop,
}

impl Command {
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'p' => Some(Command::TogglePause),
            's' => Some(Command::Snapshot),
            'q' => Some(Command::GracefulStop),
            'k' => Some(Command::ForcefulStop),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(Command::from_key('p'), Some(Command::TogglePause));
        assert_eq!(Command::from_key('s'), Some(Command::Snapshot));
        assert_eq!(Command::from_key('q'), Some(Command::GracefulStop));
        assert_eq!(Command::from_key('k'), Some(Command::ForcefulStop));
        assert_eq!(Command::from_key('x'), None);
    }

    #[test]
    fn test_event_display() {
        let event = Event::StateChange {
            turn: 4,
            state: State::Paused,
        };
        assert_eq!(event.to_string(), "turn 4: Paused");
        assert_eq!(event.turn(), 4);
    }
}
