//! Rate aggregation and status snapshots
//!
//! The aggregator consumes finished hit events and, on each bookkeeping pass,
//! turns the recent inter-event intervals into a hit rate. Every
//! `cadence_ms` of monotonic time the current rate is rounded to two decimals
//! and pushed into the rate history.

use serde::{Deserialize, Serialize};

use crate::context::DetectorContext;
use crate::ring::{RateRingBuffer, SeriesKind};
use crate::types::{ticks_diff, HitEvent};

/// Default interval between rate history pushes
pub const DEFAULT_RATE_CADENCE_MS: u32 = 30_000;

/// Largest configurable interval ring capacity
pub const MAX_INTERVAL_CAPACITY: usize = 120;

/// Largest configurable rate history length
pub const MAX_RATE_CAPACITY: usize = 120;

/// Point-in-time view of the node, as served to status readers.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Hits per second from the last bookkeeping pass
    pub rate: f32,
    /// Hits detected this run
    pub muon_count: u64,
    /// Trigger level in effect
    pub threshold: i32,
    /// Release level in effect
    pub reset_threshold: i32,
    /// Calibration baseline
    pub baseline: f32,
    /// Monotonic run time at the last bookkeeping pass
    #[serde(rename = "runtime")]
    pub runtime_seconds: u64,
    /// Whether this node reads the coincidence line
    pub is_leader: bool,
    /// Mean loop iteration time over the last bookkeeping window
    pub avg_loop_time_ms: f32,
    /// Events whose reset-wait budget ran out
    pub waited: u32,
    /// Loop iterations completed at the last bookkeeping pass
    pub iteration_count: u64,
}

/// Event counters plus the interval and rate series.
///
/// `DT` and `RATES` size the backing arrays; the logical capacities come from
/// configuration and are checked against them by
/// [`AcquisitionConfig::validate`](crate::scheduler::AcquisitionConfig::validate).
#[derive(Clone, Debug)]
pub struct TelemetryAggregator<
    const DT: usize = MAX_INTERVAL_CAPACITY,
    const RATES: usize = MAX_RATE_CAPACITY,
> {
    intervals: RateRingBuffer<DT>,
    rates: RateRingBuffer<RATES>,
    muon_count: u64,
    waited: u32,
    iteration_count: u64,
    rate: f32,
    avg_loop_time_ms: f32,
    runtime_ms: u64,
    last_bookkeeping_ms: u32,
    last_push_ms: u32,
    cadence_ms: u32,
}

impl<const DT: usize, const RATES: usize> TelemetryAggregator<DT, RATES> {
    /// Create an aggregator for a run that started at `start_ms`.
    #[must_use]
    pub const fn new(
        interval_capacity: usize,
        rate_capacity: usize,
        cadence_ms: u32,
        start_ms: u32,
    ) -> Self {
        Self {
            intervals: RateRingBuffer::new(interval_capacity, SeriesKind::IntervalMs),
            rates: RateRingBuffer::new(rate_capacity, SeriesKind::Rate),
            muon_count: 0,
            waited: 0,
            iteration_count: 0,
            rate: 0.0,
            avg_loop_time_ms: 0.0,
            runtime_ms: 0,
            last_bookkeeping_ms: start_ms,
            last_push_ms: start_ms,
            cadence_ms,
        }
    }

    /// Count a finished event and record its interval.
    pub fn record_event(&mut self, event: &HitEvent) {
        self.muon_count += 1;
        if event.timed_out() {
            self.waited += 1;
        }
        self.intervals.push(event.dt_ms as f32);
    }

    /// Recompute the rate and loop timing.
    ///
    /// `iterations` is the number of loop iterations since the previous pass.
    /// Returns `true` when the rate was pushed into the history.
    pub fn bookkeeping(&mut self, now_ms: u32, iterations: u32) -> bool {
        let elapsed = ticks_diff(now_ms, self.last_bookkeeping_ms);
        self.last_bookkeeping_ms = now_ms;
        self.runtime_ms += u64::from(elapsed);
        self.iteration_count += u64::from(iterations);
        if iterations > 0 {
            self.avg_loop_time_ms = elapsed as f32 / iterations as f32;
        }

        let mean = self.intervals.mean();
        self.rate = if mean > 0.0 { 1000.0 / mean } else { 0.0 };

        if ticks_diff(now_ms, self.last_push_ms) >= self.cadence_ms {
            self.rates.push(libm::roundf(self.rate * 100.0) / 100.0);
            self.last_push_ms = now_ms;
            true
        } else {
            false
        }
    }

    /// Status as of the last bookkeeping pass.
    #[must_use]
    pub fn status(&self, context: &DetectorContext) -> StatusSnapshot {
        let thresholds = context.thresholds();
        StatusSnapshot {
            rate: self.rate,
            muon_count: self.muon_count,
            threshold: thresholds.threshold,
            reset_threshold: thresholds.reset_threshold,
            baseline: context.calibration().baseline,
            runtime_seconds: self.runtime_ms / 1000,
            is_leader: context.role().is_leader(),
            avg_loop_time_ms: self.avg_loop_time_ms,
            waited: self.waited,
            iteration_count: self.iteration_count,
        }
    }

    /// Rate history, oldest first
    #[must_use]
    pub fn rate_history(&self) -> heapless::Vec<f32, RATES> {
        self.rates.snapshot()
    }

    /// Current rate in hits per second
    #[must_use]
    pub const fn rate(&self) -> f32 {
        self.rate
    }

    /// Hits counted this run
    #[must_use]
    pub const fn muon_count(&self) -> u64 {
        self.muon_count
    }

    /// Timed-out events this run
    #[must_use]
    pub const fn waited(&self) -> u32 {
        self.waited
    }

    /// Inter-event interval series
    #[must_use]
    pub const fn intervals(&self) -> &RateRingBuffer<DT> {
        &self.intervals
    }
}
