//! Replays a recorded game socket transcript through a round session.
//!
//! Each step of the transcript is fed to a session driver in order, with
//! real waits between steps so the local clock ticks as it would live.
//! Observer events are printed to stdout as JSON lines; logs go to stderr.

mod transcript;

use chess_core::UciMove;
use chess_round::{
    run_session, DriverSettings, GameSessionController, JsonFileStore, RoundConfig,
    SessionCommand,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn, Level};

use transcript::Step;

#[derive(Parser)]
#[command(name = "round-replay")]
#[command(about = "Replay a game socket transcript through a round session")]
struct Cli {
    /// Transcript file, one JSON step per line
    transcript: PathBuf,
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory of suspended games, overriding the configuration
    #[arg(long)]
    store_dir: Option<PathBuf>,
    /// Start from the stored record of this game instead of a fresh session
    #[arg(long)]
    resume: Option<String>,
    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config_path = cli.config.clone().unwrap_or_else(RoundConfig::config_path);
    let mut config = RoundConfig::load_from(&config_path)?;
    if let Some(dir) = cli.store_dir.clone() {
        config.store_dir = dir;
    }
    info!(config = %config_path.display(), store = %config.store_dir.display(), "starting replay");

    let steps = transcript::load(&cli.transcript).await?;
    let store = Arc::new(JsonFileStore::new(&config.store_dir));
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let session = match &cli.resume {
        Some(game_id) => GameSessionController::restore(game_id, Arc::clone(&store), events_tx)?,
        None => GameSessionController::new(Arc::clone(&store), events_tx),
    }
    .with_lag_samples(config.lag_samples);

    let (tx, rx) = mpsc::channel::<SessionCommand>(64);
    let driver = tokio::spawn(run_session(session, rx, DriverSettings::from(&config)));

    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "could not encode event"),
            }
        }
    });

    for step in steps {
        match step {
            Step::Push(message) => tx.send(SessionCommand::Push(message)).await?,
            Step::WaitMs(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            Step::ConnectionLost => tx.send(SessionCommand::ConnectionLost).await?,
            Step::Suspend => {
                let (reply, result) = oneshot::channel();
                tx.send(SessionCommand::Suspend(reply)).await?;
                match result.await? {
                    Ok(()) => info!("suspended"),
                    Err(e) => warn!(error = %e, "suspend rejected"),
                }
            }
            Step::Resume(data) => {
                let (reply, result) = oneshot::channel();
                tx.send(SessionCommand::Resume(data, reply)).await?;
                match result.await? {
                    Ok(outcome) => info!(?outcome, "resumed"),
                    Err(e) => warn!(error = %e, "resume rejected"),
                }
            }
            Step::Move(uci) => {
                let Ok(mv) = uci.parse::<UciMove>() else {
                    warn!(uci = %uci, "skipping unreadable move");
                    continue;
                };
                let (reply, result) = oneshot::channel();
                tx.send(SessionCommand::Move(mv, reply)).await?;
                match result.await? {
                    Ok(()) => info!(%mv, "move accepted"),
                    Err(e) => warn!(%mv, error = %e, "move rejected"),
                }
            }
        }
    }

    tx.send(SessionCommand::Shutdown).await?;
    let session = driver.await?;
    info!(
        game_id = ?session.game_id(),
        state = ?session.state(),
        ply = ?session.ledger().last_ply(),
        "replay finished"
    );
    drop(session);
    printer.await?;
    Ok(())
}
