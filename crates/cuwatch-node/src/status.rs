//! Status board and periodic status publishing.
//!
//! The acquisition loop pushes a fresh snapshot on every bookkeeping pass.
//! Readers (the status publish loop, anything serving status on demand) get
//! the latest value from a `watch` channel without ever blocking the loop.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use cuwatch_core::{EventPublisher, StatusSink, StatusSnapshot, Telemetry, Topic};

use crate::publish::ChannelPublisher;

/// Latest status plus the rate history, oldest first.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusView {
    /// Snapshot from the last bookkeeping pass
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    /// Periodic rate samples
    pub rates: Vec<f32>,
}

/// Write side of the status board, handed to the acquisition loop.
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<StatusView>,
}

impl StatusBoard {
    /// Create an empty board and a reader for it
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<StatusView>) {
        let (tx, rx) = watch::channel(StatusView::default());
        (Self { tx }, rx)
    }
}

impl StatusSink for StatusBoard {
    fn update(&mut self, snapshot: &StatusSnapshot, rate_history: &[f32]) {
        if snapshot.iteration_count > 0 {
            info!(
                "iter {}, # {}, {:.1} Hz, avg time {:.3} ms",
                snapshot.iteration_count, snapshot.muon_count, snapshot.rate, snapshot.avg_loop_time_ms
            );
        }
        self.tx.send_replace(StatusView { snapshot: snapshot.clone(), rates: rate_history.to_vec() });
    }
}

/// Publish the latest status every `period` until the board is dropped.
///
/// Nothing is sent before the first bookkeeping pass.
pub async fn publish_loop(
    mut rx: watch::Receiver<StatusView>,
    mut publisher: ChannelPublisher,
    period: Duration,
) -> u64 {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sent = 0u64;
    loop {
        ticker.tick().await;
        if rx.has_changed().is_err() {
            break;
        }
        let view = rx.borrow_and_update().clone();
        if view.snapshot.iteration_count == 0 {
            continue;
        }
        if publisher.publish(Topic::Status, Telemetry::Status(&view.snapshot)) {
            sent += 1;
            debug!("Sent status message");
        }
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn snapshot(iteration_count: u64) -> StatusSnapshot {
        StatusSnapshot { iteration_count, muon_count: 4, rate: 1.25, ..StatusSnapshot::default() }
    }

    #[test]
    fn test_board_holds_latest() {
        let (mut board, rx) = StatusBoard::new();
        board.update(&snapshot(10), &[1.0]);
        board.update(&snapshot(20), &[1.0, 1.5]);

        let view = rx.borrow().clone();
        assert_eq!(view.snapshot.iteration_count, 20);
        assert_eq!(view.rates, [1.0, 1.5]);
        assert_eq!(view.snapshot.muon_count, 4);
    }

    #[test]
    fn test_view_serializes_flat() {
        let view = StatusView { snapshot: snapshot(5), rates: vec![2.5] };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["muon_count"], 4);
        assert_eq!(json["rates"][0], 2.5);
    }

    #[tokio::test]
    async fn test_publish_loop_skips_until_first_pass_and_stops_with_board() {
        let (mut board, rx) = StatusBoard::new();
        let (tx, mut out) = mpsc::channel(16);
        let task = tokio::spawn(publish_loop(rx, ChannelPublisher::new(3, tx), Duration::from_millis(5)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(out.try_recv().is_err());

        board.update(&snapshot(400_000), &[]);
        let msg = out.recv().await.unwrap();
        assert_eq!(msg.topic, "status/003");
        assert!(msg.payload.contains("\"iteration_count\":400000"));

        drop(board);
        let sent = task.await.unwrap();
        assert!(sent >= 1);
    }
}
