// engine.rs - Authoritative board and the turn loop that advances it
//
// Every read and write of the board, the turn counter and the control flags
// happens under `state`. The loop only holds the lock to check flags and to
// publish a finished turn; the step itself runs unlocked, so queries stay
// responsive while a large board is being computed.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use conway::{ConwayStep, Grid, Result, SimulationParams, Snapshot, StateConflict, StepFunction};
use tracing::{debug, info};

/// Coarse view of the engine for logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Computing,
    Paused,
}

#[derive(Debug, Default)]
struct RunState {
    grid: Option<Arc<Grid>>,
    params: Option<SimulationParams>,
    current_turn: u64,
    is_computing: bool,
    is_paused: bool,
    stop_requested: bool,
}

pub struct Engine<S = ConwayStep> {
    state: Mutex<RunState>,
    // Signalled on resume and on stop
    resumed: Condvar,
    step: S,
}

impl Engine<ConwayStep> {
    pub fn new() -> Self {
        Self::with_step(ConwayStep)
    }
}

impl Default for Engine<ConwayStep> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StepFunction> Engine<S> {
    pub fn with_step(step: S) -> Self {
        Self {
            state: Mutex::new(RunState::default()),
            resumed: Condvar::new(),
            step,
        }
    }

    /// Replaces the board and parameters and rewinds to turn 0. Refused
    /// while a computation is running.
    pub fn load_initial_state(&self, grid: Grid, params: SimulationParams) -> Result<()> {
        if (grid.width(), grid.height()) != (params.width, params.height) {
            return Err(conway::Error::protocol(format!(
                "grid is {}x{} but params say {}x{}",
                grid.width(),
                grid.height(),
                params.width,
                params.height
            )));
        }

        let mut state = self.lock();
        if state.is_computing {
            return Err(StateConflict::AlreadyComputing.into());
        }
        *state = RunState {
            grid: Some(Arc::new(grid)),
            params: Some(params),
            ..RunState::default()
        };
        info!(
            width = params.width,
            height = params.height,
            turns = params.total_turns,
            threads = params.threads,
            "received world data"
        );
        Ok(())
    }

    /// Runs up to `turns` more turns on the calling thread, never past the
    /// run's `total_turns`, and returns where it stopped. Returns early if
    /// [`stop`](Self::stop) is called; blocks without spinning while paused.
    pub fn compute_turns(&self, turns: u64) -> Result<Snapshot> {
        match self.claim(turns)? {
            Claim::Done(snapshot) => Ok(snapshot),
            Claim::Pending(plan) => {
                let _computing = ComputingGuard { engine: self };
                Ok(self.advance(plan))
            }
        }
    }

    /// First half of [`compute_turns`](Self::compute_turns): marks the engine
    /// as computing without doing any turns. A `stop` or `pause` made after
    /// this returns applies to the run, even if [`Run::finish`] has not
    /// started yet.
    pub fn begin_run(self: &Arc<Self>, turns: u64) -> Result<Run<S>> {
        let claimed = match self.claim(turns)? {
            Claim::Done(snapshot) => Claimed::Done(snapshot),
            Claim::Pending(plan) => Claimed::Pending(plan, RunGuard(Arc::clone(self))),
        };
        Ok(Run { claimed })
    }

    fn claim(&self, turns: u64) -> Result<Claim> {
        let mut state = self.lock();
        if state.is_computing {
            return Err(StateConflict::AlreadyComputing.into());
        }
        let (Some(grid), Some(params)) = (state.grid.clone(), state.params) else {
            return Err(StateConflict::NoDataLoaded.into());
        };

        let target = state
            .current_turn
            .saturating_add(turns)
            .min(params.total_turns);
        if state.current_turn >= target {
            return Ok(Claim::Done(Snapshot::new(state.current_turn, grid)));
        }

        // A stop sent while idle does not carry over into this run
        state.stop_requested = false;
        state.is_computing = true;
        info!(from = state.current_turn, to = target, "beginning calculations");
        Ok(Claim::Pending(Plan {
            world: grid,
            threads: params.threads,
            target,
        }))
    }

    fn advance(&self, plan: Plan) -> Snapshot {
        let Plan {
            mut world,
            threads,
            target,
        } = plan;

        loop {
            {
                let state = self.wait_while_paused();
                if state.stop_requested || state.current_turn >= target {
                    break;
                }
            }

            let next = Arc::new(self.step.step(&world, threads));

            // A pause that lands mid-step holds the finished turn back until
            // resume, so nothing is published while paused.
            let mut state = self.wait_while_paused();
            state.grid = Some(next.clone());
            state.current_turn += 1;
            drop(state);

            world = next;
        }

        let state = self.lock();
        let snapshot = Snapshot::new(state.current_turn, world);
        info!(
            turn = snapshot.turn,
            stopped = state.stop_requested,
            "calculations finished"
        );
        snapshot
    }

    fn end_run(&self) {
        let mut state = self.lock();
        state.is_computing = false;
        state.stop_requested = false;
        state.is_paused = false;
    }

    pub fn pause(&self) -> Result<()> {
        let mut state = self.lock();
        if state.is_paused {
            return Err(StateConflict::AlreadyPaused.into());
        }
        state.is_paused = true;
        info!(turn = state.current_turn, "pausing calculations");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        let mut state = self.lock();
        if !state.is_paused {
            return Err(StateConflict::NotPaused.into());
        }
        state.is_paused = false;
        info!(turn = state.current_turn, "resuming calculations");
        drop(state);
        self.resumed.notify_all();
        Ok(())
    }

    /// Asks a running computation to finish after the current turn. Also
    /// releases a paused computation. Has no effect when idle.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.stop_requested = true;
        info!(turn = state.current_turn, computing = state.is_computing, "stopping calculations");
        drop(state);
        self.resumed.notify_all();
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let state = self.lock();
        let grid = state.grid.clone().ok_or(StateConflict::NoDataLoaded)?;
        debug!(turn = state.current_turn, "snapshot requested");
        Ok(Snapshot::new(state.current_turn, grid))
    }

    /// `(turn, alive cells)` for one consistent point in time. Counting
    /// happens after the lock is released.
    pub fn cell_count(&self) -> (u64, usize) {
        let (turn, grid) = {
            let state = self.lock();
            (state.current_turn, state.grid.clone())
        };
        let alive = grid.map_or(0, |grid| grid.alive_count());
        debug!(turn, alive, "cell count requested");
        (turn, alive)
    }

    pub fn turn(&self) -> u64 {
        self.lock().current_turn
    }

    pub fn params(&self) -> Option<SimulationParams> {
        self.lock().params
    }

    pub fn phase(&self) -> Phase {
        let state = self.lock();
        match (state.is_computing, state.is_paused) {
            (false, _) => Phase::Idle,
            (true, false) => Phase::Computing,
            (true, true) => Phase::Paused,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while_paused(&self) -> MutexGuard<'_, RunState> {
        let guard = self.lock();
        self.resumed
            .wait_while(guard, |state| state.is_paused && !state.stop_requested)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct Plan {
    world: Arc<Grid>,
    threads: usize,
    target: u64,
}

enum Claim {
    Done(Snapshot),
    Pending(Plan),
}

/// A run claimed with [`Engine::begin_run`]. Dropping it without calling
/// [`finish`](Run::finish) releases the engine.
pub struct Run<S: StepFunction = ConwayStep> {
    claimed: Claimed<S>,
}

enum Claimed<S: StepFunction> {
    Done(Snapshot),
    Pending(Plan, RunGuard<S>),
}

impl<S: StepFunction> Run<S> {
    /// Does the claimed turns on the calling thread and returns where the
    /// run stopped.
    pub fn finish(self) -> Snapshot {
        match self.claimed {
            Claimed::Done(snapshot) => snapshot,
            Claimed::Pending(plan, guard) => guard.0.advance(plan),
        }
    }
}

// Clears the run flags however a run exits, including a panicking step
struct ComputingGuard<'a, S: StepFunction> {
    engine: &'a Engine<S>,
}

impl<S: StepFunction> Drop for ComputingGuard<'_, S> {
    fn drop(&mut self) {
        self.engine.end_run();
    }
}

struct RunGuard<S: StepFunction>(Arc<Engine<S>>);

impl<S: StepFunction> Drop for RunGuard<S> {
    fn drop(&mut self) {
        self.0.end_run();
    }
}
