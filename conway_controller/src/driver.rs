use std::time::Duration;

use conway::{Client, FormatError, Method, SimulationParams, Snapshot, StateConflict, codec};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::events::{Command, Event, State};
use crate::io::{GridSink, GridSource};

pub const DEFAULT_TICK: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub params: SimulationParams,
    /// How often progress is polled while the run is in flight.
    pub tick: Duration,
}

impl SessionConfig {
    pub fn new(params: SimulationParams) -> Self {
        Self {
            params,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

/// Failures that end a session early.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not read initial board {name}: {source}")]
    Input {
        name: String,
        source: conway::Error,
    },
    #[error("worker refused the initial state: {0}")]
    Load(#[source] conway::Error),
    #[error("could not fetch the final board: {0}")]
    FinalSnapshot(#[source] conway::Error),
    #[error("could not write {name}: {source}")]
    Output {
        name: String,
        source: conway::Error,
    },
}

/// Why the control loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    /// The compute call came back on its own.
    Completed,
    /// `q`: stopped, no final output.
    GracefulStop,
    /// `k`: stopped, final output written.
    ForcefulStop,
}

impl Exit {
    pub fn wants_output(self) -> bool {
        !matches!(self, Exit::GracefulStop)
    }
}

#[derive(Clone, Debug)]
pub struct SessionOutcome {
    pub exit: Exit,
    /// The board the worker held once the run was over.
    pub snapshot: Snapshot,
}

impl SessionOutcome {
    pub fn turn(&self) -> u64 {
        self.snapshot.turn
    }
}

/// Drives one simulation on a remote worker: loads the initial board,
/// starts the run, reports progress and forwards commands until the run
/// finishes or is stopped, then collects the final board.
pub struct Controller<Src, Snk> {
    config: SessionConfig,
    source: Src,
    sink: Snk,
}

impl<Src: GridSource, Snk: GridSink> Controller<Src, Snk> {
    pub fn new(config: SessionConfig, source: Src, sink: Snk) -> Self {
        Self {
            config,
            source,
            sink,
        }
    }

    /// Runs the session to completion. `StateChange { Quitting }` is always
    /// the last event sent, whichever way the session ends, and the client
    /// is closed before it goes out.
    pub async fn run(
        &self,
        client: Client,
        events: mpsc::UnboundedSender<Event>,
        commands: mpsc::Receiver<Command>,
    ) -> Result<SessionOutcome, SessionError> {
        let mut session = Session {
            client: &client,
            events: &events,
            turn: 0,
            paused: false,
        };
        let result = self.drive(&mut session, commands).await;
        let turn = session.turn;

        if let Err(err) = &result {
            error!("session failed: {err}");
        }
        client.close().await;
        let _ = events.send(Event::StateChange {
            turn,
            state: State::Quitting,
        });
        result
    }

    async fn drive(
        &self,
        session: &mut Session<'_>,
        mut commands: mpsc::Receiver<Command>,
    ) -> Result<SessionOutcome, SessionError> {
        let params = &self.config.params;
        let name = params.image_name();
        let grid = self
            .source
            .read(&name)
            .map_err(|source| SessionError::Input {
                name: name.clone(),
                source,
            })?;
        if (grid.width(), grid.height()) != (params.width, params.height) {
            return Err(SessionError::Input {
                source: FormatError::Image(format!(
                    "board is {}x{}, the run is {}x{}",
                    grid.width(),
                    grid.height(),
                    params.width,
                    params.height
                ))
                .into(),
                name,
            });
        }

        session
            .client
            .call(Method::LoadInitialState, codec::encode_initial(&grid, params))
            .await
            .map_err(SessionError::Load)?;
        info!(
            board = %name,
            turns = params.total_turns,
            threads = params.threads,
            "initial state loaded"
        );

        let mut compute = session
            .client
            .go(Method::ComputeTurns, params.total_turns.to_string());
        session.emit(Event::StateChange {
            turn: 0,
            state: State::Executing,
        });

        let mut ticker = progress_ticker(self.config.tick);
        let mut commands_open = true;

        let (exit, finished) = loop {
            tokio::select! {
                result = &mut compute => break (Exit::Completed, result),
                _ = ticker.tick() => session.report_progress().await,
                command = commands.recv(), if commands_open => match command {
                    Some(Command::TogglePause) => session.toggle_pause().await,
                    Some(Command::Snapshot) => self.save_snapshot(session).await,
                    Some(Command::GracefulStop) => {
                        session.stop().await;
                        break (Exit::GracefulStop, compute.await);
                    }
                    Some(Command::ForcefulStop) => {
                        session.stop().await;
                        break (Exit::ForcefulStop, compute.await);
                    }
                    None => {
                        debug!("command channel closed");
                        commands_open = false;
                    }
                },
            }
        };

        match finished {
            Ok(_) => debug!(?exit, "compute call returned"),
            Err(err) => warn!(?exit, "compute call failed: {err}"),
        }

        let snapshot = session
            .fetch_snapshot()
            .await
            .map_err(SessionError::FinalSnapshot)?;
        session.turn = snapshot.turn;
        info!(turn = snapshot.turn, alive = snapshot.alive_count(), ?exit, "run over");

        if exit.wants_output() {
            let name = params.output_name(snapshot.turn);
            self.sink
                .write(&name, &snapshot.grid)
                .map_err(|source| SessionError::Output {
                    name: name.clone(),
                    source,
                })?;
            session.emit(Event::ImageOutputComplete {
                turn: snapshot.turn,
                filename: name,
            });
            session.emit(Event::FinalTurnComplete {
                turn: snapshot.turn,
                alive: snapshot.grid.alive_cells(),
            });
        }

        Ok(SessionOutcome { exit, snapshot })
    }

    async fn save_snapshot(&self, session: &mut Session<'_>) {
        let snapshot = match session.fetch_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("snapshot request failed: {err}");
                return;
            }
        };
        session.turn = snapshot.turn;
        let name = self.config.params.output_name(snapshot.turn);
        match self.sink.write(&name, &snapshot.grid) {
            Ok(()) => session.emit(Event::ImageOutputComplete {
                turn: snapshot.turn,
                filename: name,
            }),
            Err(err) => warn!(%name, "could not write snapshot: {err}"),
        }
    }
}

/// First tick one period from now. A slow handler skips the ticks it
/// missed instead of shifting the schedule.
fn progress_ticker(tick: Duration) -> Interval {
    let mut ticker = time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Per-run bookkeeping shared by the loop's handlers.
struct Session<'a> {
    client: &'a Client,
    events: &'a mpsc::UnboundedSender<Event>,
    /// Latest turn the worker told us about.
    turn: u64,
    paused: bool,
}

impl Session<'_> {
    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("no one is listening for events");
        }
    }

    async fn fetch_snapshot(&self) -> conway::Result<Snapshot> {
        let reply = self.client.call(Method::GetSnapshot, "").await?;
        Ok(codec::decode_snapshot(&reply)?)
    }

    async fn report_progress(&mut self) {
        let reply = match self.client.call(Method::GetCellCount, "").await {
            Ok(reply) => reply,
            Err(err) => {
                warn!("progress poll failed: {err}");
                return;
            }
        };
        match codec::decode_cell_count(&reply) {
            Ok((turn, count)) => {
                self.turn = turn;
                self.emit(Event::AliveCellsCount { turn, count });
            }
            Err(err) => warn!("progress poll returned {reply:?}: {err}"),
        }
    }

    async fn toggle_pause(&mut self) {
        let (method, target) = if self.paused {
            (Method::Resume, State::Executing)
        } else {
            (Method::Pause, State::Paused)
        };

        match self.client.call(method, "").await {
            Ok(_) => {}
            // The worker already is where we wanted it
            Err(err)
                if matches!(
                    (err.conflict(), target),
                    (Some(StateConflict::AlreadyPaused), State::Paused)
                        | (Some(StateConflict::NotPaused), State::Executing)
                ) =>
            {
                debug!("worker already {target}: {err}");
            }
            Err(err) => {
                warn!(?method, "pause toggle failed: {err}");
                return;
            }
        }

        self.paused = target == State::Paused;
        match self.client.call(Method::GetTurn, "").await {
            Ok(reply) => match reply.parse() {
                Ok(turn) => self.turn = turn,
                Err(_) => warn!("worker reported turn {reply:?}"),
            },
            Err(err) => warn!("turn query failed: {err}"),
        }
        info!(turn = self.turn, "{target}");
        self.emit(Event::StateChange {
            turn: self.turn,
            state: target,
        });
    }

    async fn stop(&self) {
        if let Err(err) = self.client.call(Method::Stop, "").await {
            warn!("stop request failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_ticks_keep_their_schedule() {
        let tick = Duration::from_millis(20);
        let mut ticker = progress_ticker(tick);
        assert_eq!(ticker.missed_tick_behavior(), MissedTickBehavior::Skip);
        assert_eq!(ticker.period(), tick);

        let start = Instant::now();
        // Miss several periods, as a slow command handler would
        time::sleep(Duration::from_millis(110)).await;
        ticker.tick().await;
        let late = ticker.tick().await;
        // The next tick lands back on a multiple of the period
        let offset = late.duration_since(start).as_millis() % tick.as_millis();
        assert!(offset <= 2 || offset >= 18, "tick drifted by {offset}ms");
    }

    #[test]
    fn test_only_graceful_stop_skips_output() {
        assert!(Exit::Completed.wants_output());
        assert!(Exit::ForcefulStop.wants_output());
        assert!(!Exit::GracefulStop.wants_output());
    }
}
