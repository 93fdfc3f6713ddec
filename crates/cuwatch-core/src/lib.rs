//! CUWatch Core - `no_std` acquisition core for a muon detector node
//!
//! This crate holds everything that sits between the analog front end and the
//! node's collaborators (durable log, telemetry publisher, status server,
//! control channel). It is designed to run on the microcontroller itself as
//! well as on a host for simulation and testing.
//!
//! # Modules
//!
//! - [`ring`]: Fixed-capacity rate-averaging ring buffer
//! - [`types`]: Samples, calibration, hit events, roles, thresholds
//! - [`error`]: Error types for configuration updates and the acquisition loop
//! - [`calibration`]: Baseline/noise estimation at node start
//! - [`detector`]: Hysteresis event detector with bounded reset-wait
//! - [`coincidence`]: Leader/follower coincidence line protocol
//! - [`telemetry`]: Rate aggregation and status snapshots
//! - [`context`]: Run-scoped mutable state behind validated setters
//! - [`protocol`]: Control commands and telemetry topics
//! - [`hal`]: Capability traits for the node's collaborators
//! - [`sink`]: Event sink contract (durable log + publisher)
//! - [`scheduler`]: Cooperative acquisition loop
//!
//! # Features
//!
//! - `std`: Enable standard library support (`std::error::Error` impls)
//! - `defmt`: Enable `defmt` formatting for embedded logging
//!
//! # Example
//!
//! ```rust
//! use cuwatch_core::ring::{RateRingBuffer, SeriesKind};
//!
//! let mut rates = RateRingBuffer::<8>::new(5, SeriesKind::IntervalMs);
//! for value in [10.0, 20.0, 30.0, 40.0, 50.0, 60.0] {
//!     rates.push(value);
//! }
//!
//! assert_eq!(rates.snapshot().as_slice(), &[20.0, 30.0, 40.0, 50.0, 60.0]);
//! assert!((rates.mean() - 40.0).abs() < f32::EPSILON);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(async_fn_in_trait)]

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod calibration;
pub mod coincidence;
pub mod context;
pub mod detector;
pub mod error;
pub mod hal;
pub mod protocol;
pub mod ring;
pub mod scheduler;
pub mod sink;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use calibration::{calibrate, CalibrationStats};
pub use coincidence::{CoincidenceSync, CoincidenceSynchronizer, Unconnected};
pub use context::DetectorContext;
pub use detector::EventDetector;
pub use error::{AcquisitionError, ConfigError};
pub use hal::{
    ActivityIndicator, AnalogInput, ControlSource, Cooperative, MonotonicClock, StatusSink,
    WallClock, YieldPoint,
};
pub use protocol::{ControlCommand, StopReason, Telemetry, Topic};
pub use ring::{RateRingBuffer, SeriesKind};
pub use scheduler::{AcquisitionConfig, CooperativeScheduler, Frontend, RunSummary, SchedulerBudget};
pub use sink::{DurableLog, EventPublisher, EventSink, RecordingSink};
pub use telemetry::{StatusSnapshot, TelemetryAggregator};
pub use types::{ticks_diff, HitEvent, IsoTimestamp, Role, RunCalibration, Sample, Thresholds};
