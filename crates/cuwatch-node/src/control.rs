//! Control intake.
//!
//! Control messages arrive as small JSON objects:
//!
//! ```json
//! {"threshold": 1850}
//! {"reset_threshold": 870}
//! {"command": "shutdown"}      // also "restart", "make-leader", "make-follower"
//! ```
//!
//! They are decoded once here into [`ControlCommand`]s and queued for the
//! acquisition loop, which drains the queue once per iteration. Each request
//! carries a reply channel so the sender learns whether the command was
//! accepted.

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use cuwatch_core::{ConfigError, ControlCommand, ControlSource, Role};

/// Decoding failures for control messages.
#[derive(Debug, Error)]
pub enum ControlDecodeError {
    /// Not a JSON object of the expected shape
    #[error("Malformed control message: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown `command` value
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Object carries none of the known keys
    #[error("Control message has no threshold, reset_threshold or command")]
    Empty,

    /// Object carries more than one of the known keys
    #[error("Control message must carry exactly one of threshold, reset_threshold or command")]
    Ambiguous,
}

/// The acquisition loop is gone and cannot take commands.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Acquisition loop is not accepting commands")]
pub struct ControlClosed;

#[derive(Deserialize)]
struct RawControl {
    threshold: Option<i64>,
    reset_threshold: Option<i64>,
    command: Option<String>,
}

/// Decode one JSON control message.
pub fn decode(text: &str) -> Result<ControlCommand, ControlDecodeError> {
    let raw: RawControl = serde_json::from_str(text)?;
    match (raw.threshold, raw.reset_threshold, raw.command) {
        (Some(value), None, None) => Ok(ControlCommand::SetThreshold(saturate(value))),
        (None, Some(value), None) => Ok(ControlCommand::SetResetThreshold(saturate(value))),
        (None, None, Some(command)) => match command.as_str() {
            "shutdown" => Ok(ControlCommand::Shutdown),
            "restart" => Ok(ControlCommand::Restart),
            "make-leader" => Ok(ControlCommand::SetRole(Role::Leader)),
            "make-follower" => Ok(ControlCommand::SetRole(Role::Follower)),
            _ => Err(ControlDecodeError::UnknownCommand(command)),
        },
        (None, None, None) => Err(ControlDecodeError::Empty),
        _ => Err(ControlDecodeError::Ambiguous),
    }
}

/// Out-of-`i32` values stay out of range so validation rejects them.
fn saturate(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

/// Queued command plus where to send its outcome.
#[derive(Debug)]
pub struct ControlRequest {
    /// Decoded command
    pub command: ControlCommand,
    /// Validation outcome channel
    pub reply: Option<oneshot::Sender<Result<(), ConfigError>>>,
}

/// Sending side of the control queue.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl ControlHandle {
    /// Queue a command and wait for the loop's verdict.
    pub async fn submit(&self, command: ControlCommand) -> Result<Result<(), ConfigError>, ControlClosed> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(ControlRequest { command, reply: Some(reply) })
            .await
            .map_err(|_| ControlClosed)?;
        outcome.await.map_err(|_| ControlClosed)
    }

    /// Queue a command without waiting for the outcome.
    pub fn try_submit(&self, command: ControlCommand) -> Result<(), ControlClosed> {
        self.tx.try_send(ControlRequest { command, reply: None }).map_err(|_| ControlClosed)
    }
}

/// Receiving side, drained by the acquisition loop.
#[derive(Debug)]
pub struct ControlIntake {
    rx: mpsc::Receiver<ControlRequest>,
    pending: Option<oneshot::Sender<Result<(), ConfigError>>>,
}

/// Create a control queue holding up to `depth` pending requests.
#[must_use]
pub fn channel(depth: usize) -> (ControlHandle, ControlIntake) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (ControlHandle { tx }, ControlIntake { rx, pending: None })
}

impl ControlSource for ControlIntake {
    fn next_command(&mut self) -> Option<ControlCommand> {
        let request = self.rx.try_recv().ok()?;
        self.pending = request.reply;
        Some(request.command)
    }

    fn report(&mut self, command: ControlCommand, outcome: Result<(), ConfigError>) {
        match &outcome {
            Ok(()) => info!("Applied control command: {}", command),
            Err(e) => warn!("Rejected control command {}: {}", command, e),
        }
        if let Some(reply) = self.pending.take() {
            // The sender may have stopped waiting
            let _ = reply.send(outcome);
        }
    }
}

/// Feed JSON lines from `reader` into the control queue until EOF.
///
/// Returns the number of commands accepted by the loop.
pub async fn read_commands<R>(reader: R, handle: ControlHandle) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut accepted = 0u64;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match decode(line) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring control message {:?}: {}", line, e);
                continue;
            }
        };
        match handle.submit(command).await {
            Ok(Ok(())) => accepted += 1,
            Ok(Err(_)) => {}
            Err(ControlClosed) => {
                warn!("Acquisition loop stopped, no longer reading control messages");
                break;
            }
        }
    }
    Ok(accepted)
}
