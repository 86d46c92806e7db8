use std::sync::Arc;

use conway::codec::{self, ACK};
use conway::{ConwayStep, Error, Method, Result, StepFunction};
use tracing::debug;

use crate::engine::{Engine, Run};

/// Maps each remote method onto the engine. Payload shape is checked before
/// the engine is touched, so a malformed request never changes its state.
pub struct ControlService<S = ConwayStep> {
    engine: Arc<Engine<S>>,
}

impl<S> Clone for ControlService<S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<S: StepFunction + 'static> ControlService<S> {
    pub fn new(engine: Arc<Engine<S>>) -> Self {
        Self { engine }
    }

    /// Runs a call to completion.
    pub async fn dispatch(&self, method: Method, message: String) -> Result<String> {
        self.begin(method, &message).complete().await
    }

    /// The part of a call that must happen in arrival order. Everything but
    /// the turns of a `ComputeTurns` is done here; the connection calls this
    /// before reading the next request, so a `Stop` sent after `ComputeTurns`
    /// always finds the run already claimed.
    pub fn begin(&self, method: Method, message: &str) -> Call<S> {
        match method {
            Method::ComputeTurns => match self.begin_compute(message) {
                Ok(run) => Call::Compute(run),
                Err(err) => Call::Ready(Err(err)),
            },
            other => Call::Ready(self.handle(other, message)),
        }
    }

    /// Synchronous dispatch of one call.
    pub fn handle(&self, method: Method, message: &str) -> Result<String> {
        debug!(?method, bytes = message.len(), "handling call");
        match method {
            Method::LoadInitialState => self.load_initial_state(message),
            Method::ComputeTurns => {
                let snapshot = self.begin_compute(message)?.finish();
                Ok(codec::encode_snapshot(&snapshot))
            }
            Method::Pause => {
                expect_empty(method, message)?;
                self.engine.pause()?;
                Ok(ACK.to_string())
            }
            Method::Resume => {
                expect_empty(method, message)?;
                self.engine.resume()?;
                Ok(ACK.to_string())
            }
            Method::Stop => {
                expect_empty(method, message)?;
                self.engine.stop();
                Ok(ACK.to_string())
            }
            Method::GetSnapshot => {
                expect_empty(method, message)?;
                Ok(codec::encode_snapshot(&self.engine.snapshot()?))
            }
            Method::GetCellCount => {
                expect_empty(method, message)?;
                let (turn, alive) = self.engine.cell_count();
                Ok(codec::encode_cell_count(turn, alive))
            }
            Method::GetTurn => {
                expect_empty(method, message)?;
                Ok(self.engine.turn().to_string())
            }
        }
    }

    fn load_initial_state(&self, message: &str) -> Result<String> {
        if message.is_empty() {
            return Err(Error::protocol("no world data received"));
        }
        let (grid, params) = codec::decode_initial(message)?;
        self.engine.load_initial_state(grid, params)?;
        Ok(ACK.to_string())
    }

    fn begin_compute(&self, message: &str) -> Result<Run<S>> {
        if message.is_empty() {
            return Err(Error::protocol("no turn count received"));
        }
        let turns = codec::decode_turns(message)
            .map_err(|err| Error::protocol(format!("malformed turn count: {err}")))?;
        self.engine.begin_run(turns)
    }
}

/// A call whose ordered part is done, see [`ControlService::begin`].
pub enum Call<S: StepFunction = ConwayStep> {
    Ready(Result<String>),
    Compute(Run<S>),
}

impl<S: StepFunction + 'static> Call<S> {
    /// Finishes the call. The turns go to the blocking pool because the run
    /// parks its thread while paused.
    pub async fn complete(self) -> Result<String> {
        match self {
            Call::Ready(result) => result,
            Call::Compute(run) => tokio::task::spawn_blocking(move || codec::encode_snapshot(&run.finish()))
                .await
                .map_err(|err| Error::protocol(format!("calculation aborted: {err}"))),
        }
    }
}

fn expect_empty(method: Method, message: &str) -> Result<()> {
    if message.is_empty() {
        Ok(())
    } else {
        Err(Error::protocol(format!(
            "{method:?} takes no data, was this called by accident?"
        )))
    }
}
