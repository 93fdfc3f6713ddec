//! Hysteresis event detector with bounded reset-wait
//!
//! ```text
//!            sample > threshold
//!   Idle ──────────────────────────► AboveThreshold
//!    ▲                                  │  re-read while sample > reset_threshold
//!    │                                  │  (wait_count -= 1, 1 µs pause each)
//!    └──────────────────────────────────┘
//!      sample <= reset_threshold  or  wait_count == 0  → emit HitEvent
//! ```
//!
//! `AboveThreshold` never outlives a single [`EventDetector::process`] call:
//! the detector spins on the signal until the pulse clears or the wait budget
//! runs out, so the caller always gets back a finished event.

use embedded_hal::delay::DelayNs;

use crate::coincidence::CoincidenceSync;
use crate::hal::AnalogInput;
use crate::types::{ticks_diff, HitEvent, Sample, Thresholds};

/// Default reset-wait budget in re-reads
pub const DEFAULT_WAIT_BUDGET: u16 = 150;

/// Event detector state carried across a run.
#[derive(Clone, Debug)]
pub struct EventDetector {
    wait_budget: u16,
    waited: u32,
    sequence: u64,
    last_trigger_ms: u32,
}

impl EventDetector {
    /// Detector for a run that started at `run_start_ms`.
    ///
    /// A zero budget is raised to one re-read.
    #[must_use]
    pub const fn new(wait_budget: u16, run_start_ms: u32) -> Self {
        Self {
            wait_budget: if wait_budget == 0 { 1 } else { wait_budget },
            waited: 0,
            sequence: 0,
            last_trigger_ms: run_start_ms,
        }
    }

    /// Run one sample through the state machine.
    ///
    /// `sample` was read at `now_ms`. If it crosses the trigger level the
    /// detector keeps re-reading `signal` until the pulse clears, feeding the
    /// coincidence hooks along the way, and returns the finished event.
    /// `secondary_sample` and `wall_clock` are left for the caller to fill in.
    pub fn process<A, S, D>(
        &mut self,
        sample: Sample,
        now_ms: u32,
        thresholds: Thresholds,
        signal: &mut A,
        sync: &mut S,
        delay: &mut D,
    ) -> Option<HitEvent>
    where
        A: AnalogInput + ?Sized,
        S: CoincidenceSync + ?Sized,
        D: DelayNs + ?Sized,
    {
        if !thresholds.triggers(sample) {
            return None;
        }

        sync.on_trigger();

        let mut wait_count = self.wait_budget;
        while thresholds.holds(signal.read()) {
            wait_count -= 1;
            delay.delay_us(1);
            sync.on_wait_tick();
            if wait_count == 0 {
                self.waited += 1;
                break;
            }
        }

        let coincidence = sync.on_release();
        let dt_ms = ticks_diff(now_ms, self.last_trigger_ms);
        self.last_trigger_ms = now_ms;
        self.sequence += 1;

        Some(HitEvent {
            sequence: self.sequence,
            sample_value: sample,
            secondary_sample: 0,
            dt_ms,
            timestamp_ms: now_ms,
            wall_clock: None,
            wait_count,
            coincidence,
        })
    }

    /// Events whose reset-wait budget ran out
    #[must_use]
    pub const fn waited(&self) -> u32 {
        self.waited
    }

    /// Events emitted so far
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Configured reset-wait budget
    #[must_use]
    pub const fn wait_budget(&self) -> u16 {
        self.wait_budget
    }
}
