//! Newline-delimited JSON over stdin/stdout.
//!
//! One request object per input line, one response or notification
//! object per output line. Lines that do not parse are answered directly
//! with a failure response and never reach the session.

use anyhow::{Context, Result};
use cadence_control::Outgoing;
use cadence_core::{Command, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Read requests from stdin until EOF.
pub async fn read_requests(
    commands: mpsc::Sender<Command>,
    outgoing: mpsc::Sender<Outgoing>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Command::from_json(line) {
            Ok(command) => {
                if commands.send(command).await.is_err() {
                    debug!("Session is gone, stopping reader");
                    break;
                }
            }
            Err(e) => {
                warn!("Rejected request: {e}");
                outgoing
                    .send(Outgoing::Response(Response::from_error(&e)))
                    .await
                    .context("Output channel closed")?;
            }
        }
    }

    debug!("stdin closed");
    Ok(())
}

/// Write responses and notifications to stdout, one per line.
pub async fn write_messages(mut outgoing: mpsc::Receiver<Outgoing>) -> Result<()> {
    let mut stdout = tokio::io::stdout();

    while let Some(message) = outgoing.recv().await {
        let mut json = message.to_json().context("Failed to encode message")?;
        json.push('\n');
        stdout
            .write_all(json.as_bytes())
            .await
            .context("Failed to write stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }

    Ok(())
}
