//! Host clocks.

use std::fmt::Write as _;
use std::time::Instant;

use chrono::{DateTime, Utc};

use cuwatch_core::{IsoTimestamp, MonotonicClock, WallClock};

/// ISO 8601 layout used for wall-clock stamps
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f+00:00";

/// Millisecond tick counter plus the system wall clock.
///
/// Ticks wrap at `u32::MAX` like the microcontroller's counter, so the
/// wraparound paths get exercised on the host too.
#[derive(Clone, Debug)]
pub struct HostClock {
    origin: Instant,
    offset_ms: u32,
}

impl HostClock {
    /// Clock starting at tick 0
    #[must_use]
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Clock starting at `offset_ms`, e.g. just below the wrap point
    #[must_use]
    pub fn with_offset(offset_ms: u32) -> Self {
        Self { origin: Instant::now(), offset_ms }
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for HostClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap
        #[allow(clippy::cast_possible_truncation)]
        let elapsed = self.origin.elapsed().as_millis() as u32;
        self.offset_ms.wrapping_add(elapsed)
    }
}

impl WallClock for HostClock {
    fn now_iso8601(&self) -> IsoTimestamp {
        iso8601(Utc::now())
    }
}

/// Format a UTC time the way the node stamps events and runs.
#[must_use]
pub fn iso8601(time: DateTime<Utc>) -> IsoTimestamp {
    let mut stamp = IsoTimestamp::new();
    // 32 characters always fit
    let _ = write!(stamp, "{}", time.format(ISO_FORMAT));
    stamp
}
