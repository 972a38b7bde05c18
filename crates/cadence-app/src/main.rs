//! # Cadence
//!
//! Real-time speed, pitch and loop control for a playing stream.
//! Commands arrive as JSON lines on stdin; responses and notifications
//! leave as JSON lines on stdout. Logs go to stderr.

mod transport;

use std::path::PathBuf;

use anyhow::{Context, Result};
use cadence_audio::{FilePlayer, MediaElement, SimulatedElement};
use cadence_control::{Broker, Session};
use cadence_core::{PreferenceStore, Settings};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cadence command line.
#[derive(Parser, Debug)]
#[command(name = "cadence", version, about)]
struct Args {
    /// Audio file to control
    #[arg(required_unless_present = "simulate")]
    file: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(short, long, env = "CADENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Preferences file (JSON)
    #[arg(long, env = "CADENCE_PREFERENCES")]
    preferences: Option<PathBuf>,

    /// Control a simulated stream of this many seconds instead of a file
    #[arg(long, value_name = "SECONDS", conflicts_with = "file")]
    simulate: Option<f64>,

    /// Title of the simulated stream
    #[arg(long, requires = "simulate")]
    title: Option<String>,

    /// Start playing right away
    #[arg(long)]
    autoplay: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging on stderr; stdout carries the protocol.
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cadence=info,cadence_control=info,cadence_audio=info,cadence_core=info".into()
            }),
        )
        .init();

    info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    let prefs = args
        .preferences
        .clone()
        .map_or_else(PreferenceStore::new, PreferenceStore::with_path);

    let mut element = open_element(&args, &settings)?;
    if args.autoplay {
        if let Err(e) = element.play() {
            warn!("Autoplay refused: {e}");
        }
    }

    let broker = Broker::new(element, &settings);
    let session = Session::new(broker, settings, prefs);

    let (command_tx, command_rx) = mpsc::channel(32);
    let (outgoing_tx, outgoing_rx) = mpsc::channel(64);

    let writer = tokio::spawn(transport::write_messages(outgoing_rx));
    let session_task = tokio::spawn(session.run(command_rx, outgoing_tx.clone()));

    transport::read_requests(command_tx, outgoing_tx).await?;

    session_task.await.context("Session task failed")?;
    writer.await.context("Writer task failed")??;

    info!("Cadence stopped");
    Ok(())
}

fn open_element(args: &Args, settings: &Settings) -> Result<Box<dyn MediaElement>> {
    if let Some(duration) = args.simulate {
        let title = args
            .title
            .clone()
            .unwrap_or_else(|| "Simulated stream".to_string());
        info!("Simulating '{title}' ({duration:.1}s)");
        return Ok(Box::new(
            SimulatedElement::new(title, duration)
                .with_time_update_interval(settings.audio.time_update_interval()),
        ));
    }

    let path = args
        .file
        .as_deref()
        .context("An audio file or --simulate is required")?;
    let player = FilePlayer::open(path, &settings.audio)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Box::new(player))
}
