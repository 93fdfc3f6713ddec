//! Core types for the CUWatch acquisition core
//!
//! This module provides the data model shared by every stage of the pipeline:
//! - Raw samples and the wraparound-safe monotonic time helpers
//! - Node roles for coincidence pairing
//! - Run calibration and the live threshold pair
//! - Hit events as handed to the event sink

use core::fmt;

use serde::{Deserialize, Serialize};

/// Raw analog sample as produced by the front end (full 16-bit range).
pub type Sample = u16;

/// Highest value a threshold may take (the sample range ceiling).
pub const SAMPLE_MAX: i32 = Sample::MAX as i32;

/// ISO 8601 wall-clock timestamp, e.g. `2024-05-01T12:00:00.000000+00:00`.
pub type IsoTimestamp = heapless::String<40>;

// ============================================================================
// Monotonic Time
// ============================================================================

/// Elapsed milliseconds between two readings of a wrapping `u32` clock.
///
/// The monotonic tick counter wraps after ~49.7 days; the modular difference
/// stays correct across a single wrap.
///
/// # Example
///
/// ```
/// use cuwatch_core::types::ticks_diff;
///
/// assert_eq!(ticks_diff(2, u32::MAX - 1), 4);
/// assert_eq!(ticks_diff(1_500, 1_000), 500);
/// ```
#[inline]
#[must_use]
pub const fn ticks_diff(now_ms: u32, earlier_ms: u32) -> u32 {
    now_ms.wrapping_sub(earlier_ms)
}

// ============================================================================
// Node Role
// ============================================================================

/// Coincidence role of a node, fixed for the lifetime of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Reads the shared coincidence line
    #[default]
    Leader,
    /// Drives the shared coincidence line while above threshold
    Follower,
}

impl Role {
    /// Check if this is the leader role
    #[inline]
    #[must_use]
    pub const fn is_leader(self) -> bool {
        matches!(self, Self::Leader)
    }

    /// Short lowercase name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Follower => "follower",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Role {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "{}", self.name());
    }
}

// ============================================================================
// Thresholds
// ============================================================================

/// Hysteresis pair in raw sample units.
///
/// A hit triggers when a sample is strictly above `threshold` and clears once
/// a sample is at or below `reset_threshold`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Trigger level
    pub threshold: i32,
    /// Release level
    pub reset_threshold: i32,
}

impl Thresholds {
    /// Create a threshold pair
    #[must_use]
    pub const fn new(threshold: i32, reset_threshold: i32) -> Self {
        Self { threshold, reset_threshold }
    }

    /// Check if a sample crosses the trigger level
    #[inline]
    #[must_use]
    pub const fn triggers(&self, sample: Sample) -> bool {
        sample as i32 > self.threshold
    }

    /// Check if a sample is still above the release level
    #[inline]
    #[must_use]
    pub const fn holds(&self, sample: Sample) -> bool {
        sample as i32 > self.reset_threshold
    }
}

// ============================================================================
// Run Calibration
// ============================================================================

/// Calibration computed once at node start, with no hits expected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunCalibration {
    /// Mean of the calibration samples
    pub baseline: f32,
    /// Population standard deviation of the calibration samples
    pub stddev: f32,
    /// Initial trigger level
    pub threshold: i32,
    /// Initial release level
    pub reset_threshold: i32,
    /// Wall-clock time the run started
    pub run_start_time: IsoTimestamp,
    /// Whether this node reads the coincidence line
    pub is_leader: bool,
}

impl RunCalibration {
    /// Derive the threshold pair from a measured baseline.
    ///
    /// Both levels are `round(baseline + offset)`.
    #[must_use]
    pub fn from_baseline(
        baseline: f32,
        stddev: f32,
        trigger_offset: f32,
        reset_offset: f32,
        run_start_time: IsoTimestamp,
        role: Role,
    ) -> Self {
        Self {
            baseline,
            stddev,
            threshold: libm::roundf(baseline + trigger_offset) as i32,
            reset_threshold: libm::roundf(baseline + reset_offset) as i32,
            run_start_time,
            is_leader: role.is_leader(),
        }
    }

    /// Threshold pair in effect at run start
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.threshold, self.reset_threshold)
    }

    /// Role recorded for this run
    #[must_use]
    pub const fn role(&self) -> Role {
        if self.is_leader {
            Role::Leader
        } else {
            Role::Follower
        }
    }

    /// Write the run header block of the durable log.
    ///
    /// Three lines: calibration column names, calibration values, event
    /// column names.
    pub fn write_csv_header<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        w.write_str("baseline,stddev,threshold,reset_threshold,run_start_time,is_leader\n")?;
        writeln!(
            w,
            "{:.1}, {:.1}, {}, {}, {}, {}",
            self.baseline,
            self.stddev,
            self.threshold,
            self.reset_threshold,
            self.run_start_time,
            u8::from(self.is_leader)
        )?;
        w.write_str(HitEvent::CSV_COLUMNS)?;
        w.write_char('\n')
    }
}

// ============================================================================
// Hit Event
// ============================================================================

/// A detected particle hit, as handed to the event sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitEvent {
    /// Detection order within the run, starting at 1
    pub sequence: u64,
    /// Sample that crossed the trigger level
    pub sample_value: Sample,
    /// Secondary (temperature) channel read after the pulse cleared
    pub secondary_sample: Sample,
    /// Milliseconds since the previous trigger (or the run start)
    pub dt_ms: u32,
    /// Monotonic trigger time
    pub timestamp_ms: u32,
    /// Wall-clock stamp, carried by the first event of a run only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_clock: Option<IsoTimestamp>,
    /// Remaining reset-wait budget when the pulse cleared (0 = timed out)
    pub wait_count: u16,
    /// Whether the paired node's line was seen high during this event
    pub coincidence: bool,
}

impl HitEvent {
    /// Column header for durable log records
    pub const CSV_COLUMNS: &'static str = "Muon Count,ADC,temperature_ADC,dt,t,t_wait,coinc";

    /// Check if the reset-wait budget ran out for this event
    #[inline]
    #[must_use]
    pub const fn timed_out(&self) -> bool {
        self.wait_count == 0
    }

    /// Write this event as one durable log line (with trailing newline).
    pub fn write_csv<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        writeln!(
            w,
            "{}, {}, {}, {}, {}, {}, {}",
            self.sequence,
            self.sample_value,
            self.secondary_sample,
            self.dt_ms,
            self.timestamp_ms,
            self.wait_count,
            u8::from(self.coincidence)
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for HitEvent {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Hit #{} adc={} dt={}ms wait={} coinc={}",
            self.sequence,
            self.sample_value,
            self.dt_ms,
            self.wait_count,
            self.coincidence
        );
    }
}

// ============================================================================
// Tests
// ============================================================================
