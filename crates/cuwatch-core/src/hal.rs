//! Capability traits for the node's collaborators
//!
//! The core never talks to hardware or the network directly. Everything it
//! needs is expressed as one of these traits (plus `embedded-hal`'s
//! `InputPin` / `OutputPin` / `DelayNs`), implemented by the embedded crate
//! on the device and by the host runtime in simulation.

use crate::error::ConfigError;
use crate::protocol::ControlCommand;
use crate::telemetry::StatusSnapshot;
use crate::types::{IsoTimestamp, Sample};

/// Analog input sampled on demand.
pub trait AnalogInput {
    /// Latest conversion result; must return immediately.
    fn read(&mut self) -> Sample;
}

impl<T: AnalogInput + ?Sized> AnalogInput for &mut T {
    #[inline]
    fn read(&mut self) -> Sample {
        (**self).read()
    }
}

/// Wrapping millisecond tick counter.
///
/// Differences must be taken with [`ticks_diff`](crate::types::ticks_diff).
pub trait MonotonicClock {
    /// Current tick count in milliseconds
    fn now_ms(&self) -> u32;
}

/// Best-effort wall clock (may be wrong if time sync failed upstream).
pub trait WallClock {
    /// Current time as ISO 8601 (UTC)
    fn now_iso8601(&self) -> IsoTimestamp;
}

/// Cosmetic activity LED.
pub trait ActivityIndicator {
    /// Switch the indicator
    fn set(&mut self, on: bool);

    /// Flip the heartbeat state
    fn toggle_heartbeat(&mut self) {}
}

impl ActivityIndicator for () {
    #[inline]
    fn set(&mut self, _on: bool) {}
}

/// Where the acquisition loop hands control back to the runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum YieldPoint {
    /// Regular yield every `yield_every` iterations
    Periodic,
    /// Yield right after a reset-wait timeout
    ResetTimeout,
}

/// Explicit cooperative-yield contract.
///
/// Background work (status serving, publishing, control intake) only runs
/// while the acquisition loop is suspended in `yield_now`.
pub trait Cooperative {
    /// Suspend so other tasks can run
    async fn yield_now(&mut self, point: YieldPoint);
}

/// Source of validated control commands, drained once per loop iteration.
pub trait ControlSource {
    /// Next pending command, if any
    fn next_command(&mut self) -> Option<ControlCommand>;

    /// Outcome of the command most recently returned by `next_command`
    fn report(&mut self, command: ControlCommand, outcome: Result<(), ConfigError>) {
        let _ = (command, outcome);
    }
}

/// Pull-side status board fed by each bookkeeping pass.
pub trait StatusSink {
    /// Replace the published status and rate history (oldest first)
    fn update(&mut self, snapshot: &StatusSnapshot, rate_history: &[f32]);
}

impl StatusSink for () {
    fn update(&mut self, _snapshot: &StatusSnapshot, _rate_history: &[f32]) {}
}
