//! Telemetry publisher.
//!
//! The acquisition loop never waits on the network: [`ChannelPublisher`]
//! encodes a payload and `try_send`s it onto a bounded queue. A background
//! task drains the queue into the transport. A full queue drops the message
//! and reports the failure back to the loop.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use cuwatch_core::{EventPublisher, Telemetry, Topic};

/// Encoded message ready for the transport.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Outgoing {
    /// Full topic, e.g. `telemetry/003`
    pub topic: String,
    /// Compact JSON payload
    pub payload: String,
}

#[derive(Serialize)]
struct Envelope<'a> {
    device_number: u16,
    #[serde(flatten)]
    body: Telemetry<'a>,
}

/// Publisher feeding the outgoing queue.
#[derive(Clone, Debug)]
pub struct ChannelPublisher {
    device_id: u16,
    tx: mpsc::Sender<Outgoing>,
}

impl ChannelPublisher {
    /// Publisher for `device_id` sending into `tx`
    #[must_use]
    pub fn new(device_id: u16, tx: mpsc::Sender<Outgoing>) -> Self {
        Self { device_id, tx }
    }

    /// Full topic name for this device
    #[must_use]
    pub fn topic(&self, topic: Topic) -> String {
        format!("{}/{:03}", topic.prefix(), self.device_id)
    }
}

impl EventPublisher for ChannelPublisher {
    fn publish(&mut self, topic: Topic, payload: Telemetry<'_>) -> bool {
        let envelope = Envelope { device_number: self.device_id, body: payload };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode {:?} payload: {}", topic, e);
                return false;
            }
        };

        match self.tx.try_send(Outgoing { topic: self.topic(topic), payload }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                warn!("Publish queue full, dropped message on {}", msg.topic);
                false
            }
            Err(mpsc::error::TrySendError::Closed(msg)) => {
                warn!("Publisher closed, dropped message on {}", msg.topic);
                false
            }
        }
    }
}

/// Write queued messages as JSON lines until every sender is gone.
///
/// Returns the number of messages written.
pub async fn drain<W>(mut rx: mpsc::Receiver<Outgoing>, mut out: W) -> std::io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(msg) = rx.recv().await {
        let mut line = serde_json::to_vec(&msg)?;
        line.push(b'\n');
        out.write_all(&line).await?;
        out.flush().await?;
        written += 1;
        debug!("Published on {}", msg.topic);
    }
    Ok(written)
}
