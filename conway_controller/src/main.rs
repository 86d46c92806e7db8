use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use conway::{Client, SimulationParams};
use conway_controller::{
    Command, Controller, DEFAULT_IMAGE_DIR, DEFAULT_OUTPUT_DIR, DEFAULT_TURNS, GridSource, PatternSource,
    PgmDirectory, SessionConfig,
};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Game of Life controller: drives a run on a worker and takes commands
/// from stdin (p pause/resume, s snapshot, q quit, k stop and save).
#[derive(Parser)]
#[command(name = "conway_controller")]
struct Args {
    /// Worker address.
    #[arg(long, default_value = conway::DEFAULT_WORKER_ADDR)]
    worker: String,
    #[arg(long, default_value_t = 64)]
    width: usize,
    #[arg(long, default_value_t = 64)]
    height: usize,
    #[arg(long, default_value_t = DEFAULT_TURNS)]
    turns: u64,
    /// Row bands the worker computes in parallel.
    #[arg(long, default_value_t = conway::grid::DEFAULT_THREADS)]
    threads: usize,
    /// Read the initial board from `<images>/<width>x<height>.pgm` instead
    /// of building it from --pattern.
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_IMAGE_DIR)]
    images: Option<String>,
    /// Where finished boards are written.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    out: String,
    /// Named pattern or "random".
    #[arg(long, default_value = "random")]
    pattern: String,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Progress poll interval in milliseconds.
    #[arg(long, default_value_t = 2000)]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.width == 0 || args.height == 0 {
        bail!("board must be at least 1x1, got {}x{}", args.width, args.height);
    }

    let source: Box<dyn GridSource> = match &args.images {
        Some(dir) => Box::new(PgmDirectory::new(dir, &args.out)),
        None => Box::new(
            PatternSource::named(&args.pattern, args.seed)
                .with_context(|| format!("unknown pattern {:?}", args.pattern))?,
        ),
    };
    let sink = PgmDirectory::new(DEFAULT_IMAGE_DIR, &args.out);

    let params = SimulationParams::new(args.width, args.height, args.turns).with_threads(args.threads);
    let config = SessionConfig::new(params).with_tick(Duration::from_millis(args.tick_ms.max(1)));
    let controller = Controller::new(config, source, sink);

    let client = Client::connect(&args.worker)
        .await
        .with_context(|| format!("failed to connect to worker at {}", args.worker))?;
    info!(worker = %args.worker, "connected");

    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (commands_tx, commands) = mpsc::channel(8);

    // Plain thread: a pending stdin read must not hold up runtime shutdown
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { return };
            for key in line.chars().filter(|c| !c.is_whitespace()) {
                match Command::from_key(key) {
                    Some(command) => {
                        if commands_tx.blocking_send(command).is_err() {
                            return;
                        }
                    }
                    None => debug!(%key, "ignoring key"),
                }
            }
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!("{event}");
        }
    });

    let outcome = controller.run(client, events_tx, commands).await;
    let _ = printer.await;
    let outcome = outcome.context("session failed")?;
    info!(turn = outcome.turn(), alive = outcome.snapshot.alive_count(), "done");
    Ok(())
}
