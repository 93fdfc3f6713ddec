//! Node supervisor: the run/restart loop and its background tasks.
//!
//! Each run reloads the persisted role, recalibrates, opens a fresh CSV log
//! and drives the acquisition loop until a stop request. A `restart` command
//! starts the next run; `shutdown` or the switch ends the node.
//!
//! Background tasks (telemetry writer, status publisher) are spawned with
//! `spawn_local`, so [`Node::run`] must be awaited inside a
//! [`tokio::task::LocalSet`].

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use cuwatch_core::{
    CoincidenceSynchronizer, CooperativeScheduler, Frontend, RecordingSink, Role, RunSummary,
    StopReason,
};

use crate::clock::HostClock;
use crate::config::NodeConfig;
use crate::control::ControlIntake;
use crate::durable::CsvLog;
use crate::publish::{self, ChannelPublisher};
use crate::role::RoleStore;
use crate::runtime::{HeartbeatLog, SpinDelay, TokioYield};
use crate::sim::{SharedLine, SimulatedSignal, SimulatedTemperature};
use crate::status::{self, StatusBoard};

type SimFrontend = Frontend<SimulatedSignal, SimulatedTemperature, SpinDelay, HostClock, HeartbeatLog>;

/// What a node did before it stopped.
#[derive(Debug)]
pub struct NodeReport {
    /// Runs started, restarts included
    pub runs: u32,
    /// Summary of the final run
    pub last: RunSummary,
    /// CSV file of every run, oldest first
    pub files: Vec<PathBuf>,
    /// Messages handed to the transport
    pub published: u64,
}

/// A simulated detector node.
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    device_id: u16,
    roles: RoleStore,
    switch: Arc<AtomicBool>,
}

impl Node {
    /// Set up a node; resolves the device id from the data directory if needed.
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        config.acquisition.validate().context("Invalid acquisition settings")?;
        let device_id = config.resolve_device_id()?;
        let roles = RoleStore::new(&config.data_dir);
        Ok(Self { config, device_id, roles, switch: Arc::new(AtomicBool::new(false)) })
    }

    /// Device number used in topics
    #[must_use]
    pub const fn device_id(&self) -> u16 {
        self.device_id
    }

    /// Flag that stops the node when raised
    #[must_use]
    pub fn switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.switch)
    }

    /// Run until shutdown, writing telemetry as JSON lines to `out`.
    ///
    /// # Errors
    ///
    /// Fails if a run's log cannot be created or written, or the role marker
    /// cannot be updated.
    pub async fn run<W>(&self, mut intake: ControlIntake, out: W) -> anyhow::Result<NodeReport>
    where
        W: AsyncWrite + Unpin + 'static,
    {
        let (out_tx, out_rx) = mpsc::channel(self.config.publish_queue.max(1));
        let writer = tokio::task::spawn_local(publish::drain(out_rx, out));

        let (mut board, status_rx) = StatusBoard::new();
        let status_task = tokio::task::spawn_local(status::publish_loop(
            status_rx,
            ChannelPublisher::new(self.device_id, out_tx.clone()),
            self.config.status_interval(),
        ));

        let acquisition = self.config.acquisition;
        let line = SharedLine::default();
        let mut frontend: SimFrontend = Frontend {
            signal: SimulatedSignal::new(self.config.simulation.clone(), None),
            secondary: SimulatedTemperature::new(&self.config.simulation),
            delay: SpinDelay,
            clock: HostClock::new(),
            indicator: HeartbeatLog::default(),
        };

        let mut runs = 0u32;
        let mut files = Vec::new();
        let outcome = loop {
            runs += 1;
            let role = self.roles.load();
            info!("Starting run {} as {}", runs, role);

            // The simulated partner node drives the line only when we read it
            line.set(false);
            let partner = (role == Role::Leader).then(|| line.clone());
            frontend.signal = SimulatedSignal::new(self.config.simulation.clone(), partner);
            let sync = match role {
                Role::Leader => CoincidenceSynchronizer::leader(line.clone()),
                Role::Follower => CoincidenceSynchronizer::follower(line.clone()),
            };

            let mut scheduler = CooperativeScheduler::calibrated(frontend, sync, role, &acquisition);
            let calibration = scheduler.context().calibration();
            info!(
                "Calibrated: baseline {:.1}, stddev {:.1}, threshold {}, reset {}",
                calibration.baseline, calibration.stddev, calibration.threshold, calibration.reset_threshold
            );

            let log = match CsvLog::create(&self.config.data_dir, calibration, Utc::now()) {
                Ok(log) => log,
                Err(e) => break Err(anyhow::Error::new(e).context("Cannot open run log")),
            };
            info!("Logging to {}", log.path().display());
            files.push(log.path().to_path_buf());

            let mut sink = RecordingSink::new(log, ChannelPublisher::new(self.device_id, out_tx.clone()));
            let result = scheduler
                .run(&mut sink, &mut intake, &mut board, &mut TokioYield, &self.switch)
                .await;
            if sink.publish_failures() > 0 {
                warn!("{} event publishes dropped this run", sink.publish_failures());
            }
            frontend = scheduler.into_frontend();

            let summary = match result {
                Ok(summary) => summary,
                Err(e) => {
                    error!("Run {} aborted: {}", runs, e);
                    break Err(anyhow::Error::new(e).context("Durable log failed"));
                }
            };
            info!(
                "Run {} stopped ({}): {} iterations, {} muons, {} waited",
                runs, summary.reason, summary.iterations, summary.muon_count, summary.waited
            );

            if let Some(next) = summary.requested_role {
                if let Err(e) = self.roles.persist(next) {
                    break Err(anyhow::Error::new(e));
                }
            }
            if summary.reason != StopReason::Restart {
                break Ok(summary);
            }
        };

        // The status loop only notices a dropped board on its next tick
        status_task.abort();
        let _ = status_task.await;
        drop(board);
        drop(out_tx);
        let published = writer.await.context("Telemetry writer panicked")??;

        let last = outcome?;
        info!("Node stopped after {} run(s), {} messages published", runs, published);
        Ok(NodeReport { runs, last, files, published })
    }
}
