//! Baseline and noise estimation at node start
//!
//! Calibration runs with the detector armed but no hits expected: it takes
//! `samples` readings spaced `pacing_ms` apart and reports their mean and
//! population standard deviation. The thresholds for the run are then offset
//! from that mean (see [`RunCalibration::from_baseline`]).

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use crate::hal::AnalogInput;
use crate::types::{IsoTimestamp, Role, RunCalibration};

/// Summary statistics of a calibration pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStats {
    /// Mean sample value
    pub mean: f32,
    /// Population standard deviation
    pub stddev: f32,
    /// Number of samples taken
    pub samples: u32,
}

impl CalibrationStats {
    /// Build the run calibration from these statistics.
    #[must_use]
    pub fn into_calibration(
        self,
        trigger_offset: f32,
        reset_offset: f32,
        run_start_time: IsoTimestamp,
        role: Role,
    ) -> RunCalibration {
        RunCalibration::from_baseline(
            self.mean,
            self.stddev,
            trigger_offset,
            reset_offset,
            run_start_time,
            role,
        )
    }
}

/// Sample the quiet detector and compute its baseline.
///
/// `samples == 0` yields all-zero statistics without touching the input.
pub fn calibrate<A, D>(input: &mut A, delay: &mut D, samples: u32, pacing_ms: u32) -> CalibrationStats
where
    A: AnalogInput + ?Sized,
    D: DelayNs + ?Sized,
{
    if samples == 0 {
        return CalibrationStats::default();
    }

    let mut sum: u64 = 0;
    let mut sum_squared: u64 = 0;
    for _ in 0..samples {
        let value = u64::from(input.read());
        sum += value;
        sum_squared += value * value;
        delay.delay_ms(pacing_ms);
    }

    let n = f64::from(samples);
    let mean = sum as f64 / n;
    // Rounding can push E[x^2] - mean^2 slightly negative for a flat signal
    let variance = (sum_squared as f64 / n - mean * mean).max(0.0);

    CalibrationStats {
        mean: mean as f32,
        stddev: libm::sqrt(variance) as f32,
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Script<'a> {
        values: &'a [u16],
        pos: usize,
    }

    impl AnalogInput for Script<'_> {
        fn read(&mut self) -> u16 {
            let v = self.values[self.pos % self.values.len()];
            self.pos += 1;
            v
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        total_ns: u64,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ns += u64::from(ns);
        }
    }

    #[test]
    fn test_flat_signal_has_zero_stddev() {
        let mut input = Script { values: &[812], pos: 0 };
        let mut delay = CountingDelay::default();
        let stats = calibrate(&mut input, &mut delay, 500, 10);
        assert_eq!(stats.samples, 500);
        assert!((stats.mean - 812.0).abs() < 1e-3);
        assert_eq!(stats.stddev, 0.0);
        assert_eq!(input.pos, 500);
        assert_eq!(delay.total_ns, 500 * 10 * 1_000_000);
    }

    #[test]
    fn test_population_stddev() {
        // mean 5, population variance 4
        let mut input = Script { values: &[2, 4, 4, 4, 5, 5, 7, 9], pos: 0 };
        let stats = calibrate(&mut input, &mut CountingDelay::default(), 8, 0);
        assert!((stats.mean - 5.0).abs() < 1e-6);
        assert!((stats.stddev - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_samples() {
        let mut input = Script { values: &[1], pos: 0 };
        let stats = calibrate(&mut input, &mut CountingDelay::default(), 0, 10);
        assert_eq!(stats, CalibrationStats::default());
        assert_eq!(input.pos, 0);
    }

    #[test]
    fn test_thresholds_from_stats() {
        let stats = CalibrationStats { mean: 799.6, stddev: 4.0, samples: 500 };
        let cal = stats.into_calibration(1000.0, 50.0, IsoTimestamp::new(), Role::Leader);
        assert_eq!(cal.threshold, 1800);
        assert_eq!(cal.reset_threshold, 850);
        assert!(cal.is_leader);
    }
}
