mod viewer;

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use conway::SimulationParams;
use conway_controller::{DEFAULT_TURNS, PatternSource, SessionConfig};
use eframe::egui;

use crate::viewer::Viewer;

/// Watches a Game of Life run on a worker. Keys: P pause/resume,
/// S snapshot, Q quit, K stop and keep the final board.
#[derive(Parser)]
#[command(name = "grid_display")]
struct Args {
    #[arg(long, default_value = conway::DEFAULT_WORKER_ADDR)]
    worker: String,
    #[arg(long, default_value_t = 50)]
    width: usize,
    #[arg(long, default_value_t = 50)]
    height: usize,
    #[arg(long, default_value_t = DEFAULT_TURNS)]
    turns: u64,
    #[arg(long, default_value_t = conway::grid::DEFAULT_THREADS)]
    threads: usize,
    /// Named pattern or "random".
    #[arg(long, default_value = "random")]
    pattern: String,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 500)]
    tick_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let source = PatternSource::named(&args.pattern, args.seed)
        .with_context(|| format!("unknown pattern {:?}", args.pattern))?;
    let params = SimulationParams::new(args.width, args.height, args.turns).with_threads(args.threads);
    let config = SessionConfig::new(params).with_tick(Duration::from_millis(args.tick_ms.max(1)));

    let viewer = Viewer::start(&args.worker, config, source).context("failed to start session")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([820.0, 900.0]),
        ..Default::default()
    };
    eframe::run_native("Grid Display", options, Box::new(|_cc| Box::new(viewer)))
        .map_err(|err| anyhow!("viewer failed: {err}"))
}
