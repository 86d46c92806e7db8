// viewer.rs - egui front end for one controller session

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Context as _;
use conway::{Client, Grid, SimulationParams};
use conway_controller::{Command, Controller, Event, MemorySink, PatternSource, SessionConfig, SessionOutcome, State};
use eframe::egui;
use egui::{Color32, Key, Rect, Stroke, Vec2};
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const LOG_LINES: usize = 8;

pub struct Viewer {
    runtime: Runtime,
    session: Option<JoinHandle<anyhow::Result<SessionOutcome>>>,
    commands: mpsc::Sender<Command>,
    events: mpsc::UnboundedReceiver<Event>,
    sink: MemorySink,
    params: SimulationParams,

    state: State,
    turn: u64,
    alive: Option<usize>,
    /// Latest board we have seen and the turn it belongs to.
    board: Option<(u64, Grid)>,
    log: VecDeque<String>,
    outcome: Option<String>,

    live_color: Color32,
    dead_color: Color32,
}

impl Viewer {
    /// Connects to the worker and starts the session on a runtime owned by
    /// the viewer.
    pub fn start(worker: &str, config: SessionConfig, source: PatternSource) -> anyhow::Result<Self> {
        let runtime = Runtime::new().context("failed to build runtime")?;
        let sink = MemorySink::default();
        let params = config.params;
        let controller = Controller::new(config, source, sink.clone());

        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::channel(16);
        let worker = worker.to_string();
        let session = runtime.spawn(async move {
            let client = Client::connect(&worker)
                .await
                .with_context(|| format!("failed to connect to worker at {worker}"))?;
            info!(%worker, "connected");
            Ok(controller.run(client, events_tx, commands_rx).await?)
        });

        Ok(Self {
            runtime,
            session: Some(session),
            commands,
            events,
            sink,
            params,
            state: State::Executing,
            turn: 0,
            alive: None,
            board: None,
            log: VecDeque::with_capacity(LOG_LINES),
            outcome: None,
            live_color: Color32::WHITE,
            dead_color: Color32::BLACK,
        })
    }

    fn send(&mut self, command: Command) {
        if self.session.is_none() {
            return;
        }
        if let Err(err) = self.commands.try_send(command) {
            warn!(?command, "command dropped: {err}");
        }
    }

    fn record(&mut self, line: String) {
        if self.log.len() == LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.record(event.to_string());
            self.turn = self.turn.max(event.turn());
            match event {
                Event::AliveCellsCount { count, .. } => self.alive = Some(count),
                Event::StateChange { state, .. } => self.state = state,
                Event::ImageOutputComplete { filename, turn } => {
                    if let Some((name, grid)) = self.sink.last().filter(|(name, _)| *name == filename) {
                        info!(%name, "showing board");
                        self.board = Some((turn, grid));
                    }
                }
                Event::FinalTurnComplete { turn, alive } => {
                    self.alive = Some(alive.len());
                    let grid = Grid::with_alive(self.params.width, self.params.height, &alive);
                    self.board = Some((turn, grid));
                }
            }
        }
    }

    fn collect_session(&mut self) {
        if !self.session.as_ref().is_some_and(JoinHandle::is_finished) {
            return;
        }
        let Some(handle) = self.session.take() else {
            return;
        };
        let summary = match self.runtime.block_on(handle) {
            Ok(Ok(outcome)) => format!(
                "finished at turn {} with {} alive cells ({:?})",
                outcome.turn(),
                outcome.snapshot.alive_count(),
                outcome.exit
            ),
            Ok(Err(err)) => format!("session failed: {err:#}"),
            Err(err) => format!("session task failed: {err}"),
        };
        info!("{summary}");
        self.outcome = Some(summary);
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        let pressed: Vec<Command> = ctx.input(|input| {
            [
                (Key::P, Command::TogglePause),
                (Key::S, Command::Snapshot),
                (Key::Q, Command::GracefulStop),
                (Key::K, Command::ForcefulStop),
            ]
            .into_iter()
            .filter(|(key, _)| input.key_pressed(*key))
            .map(|(_, command)| command)
            .collect()
        });
        for command in pressed {
            self.send(command);
        }
    }

    fn draw_board(&self, ui: &mut egui::Ui, grid: &Grid) {
        let width = grid.width().max(1) as f32;
        let height = grid.height().max(1) as f32;
        let box_size = (ui.available_width() / width).clamp(2.0, 15.0);
        let spacing = if box_size >= 6.0 { 0.5 } else { 0.0 };

        let start_pos = ui.cursor().min;
        let total_size = Vec2::new(width * box_size, height * box_size);
        let (_response, painter) = ui.allocate_painter(total_size, egui::Sense::hover());
        painter.rect_filled(Rect::from_min_size(start_pos, total_size), 0.0, self.dead_color);

        for (y, row) in grid.rows().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                if !cell.is_alive() {
                    continue;
                }
                let rect = Rect::from_min_size(
                    egui::pos2(start_pos.x + x as f32 * box_size, start_pos.y + y as f32 * box_size),
                    Vec2::splat(box_size - spacing),
                );
                painter.rect_filled(rect, 0.0, self.live_color);
                if spacing > 0.0 {
                    painter.rect_stroke(rect, 0.0, Stroke::new(0.2, Color32::from_gray(60)));
                }
            }
        }
    }
}

impl eframe::App for Viewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        self.collect_session();
        self.handle_keys(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading(format!(
                "Game of Life on {}x{}, {} turns",
                self.params.width, self.params.height, self.params.total_turns
            ));

            ui.horizontal(|ui| {
                let running = self.session.is_some();
                let pause_text = if self.state == State::Paused { "▶ Resume" } else { "⏸ Pause" };
                if ui.add_enabled(running, egui::Button::new(pause_text)).clicked() {
                    self.send(Command::TogglePause);
                }
                if ui.add_enabled(running, egui::Button::new("📷 Snapshot")).clicked() {
                    self.send(Command::Snapshot);
                }
                if ui.add_enabled(running, egui::Button::new("⏹ Stop and save")).clicked() {
                    self.send(Command::ForcefulStop);
                }
                if ui.add_enabled(running, egui::Button::new("✖ Quit")).clicked() {
                    self.send(Command::GracefulStop);
                }

                ui.separator();
                ui.label("Live:");
                ui.color_edit_button_srgba(&mut self.live_color);
                ui.label("Dead:");
                ui.color_edit_button_srgba(&mut self.dead_color);
            });

            ui.separator();
            ui.horizontal(|ui| {
                ui.label(format!("State: {}", self.state));
                ui.label(format!("Turn: {}", self.turn));
                match self.alive {
                    Some(alive) => ui.label(format!("Alive: {alive}")),
                    None => ui.label("Alive: -"),
                };
            });
            if let Some(outcome) = &self.outcome {
                ui.label(outcome.as_str());
            }

            ui.separator();
            match &self.board {
                Some((turn, grid)) => {
                    ui.label(format!("Board at turn {turn}"));
                    self.draw_board(ui, grid);
                }
                None => {
                    ui.label("Press S for a snapshot of the board.");
                }
            }

            ui.separator();
            for line in &self.log {
                ui.monospace(line.as_str());
            }
        });

        if self.session.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}
