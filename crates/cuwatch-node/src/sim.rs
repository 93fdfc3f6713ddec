//! Simulated detector front end.
//!
//! Lets the whole node run on a host without hardware: the signal is a noisy
//! baseline with pulses at Poisson-distributed times, and a [`SharedLine`]
//! stands in for the coincidence wire. When a paired "partner" is simulated,
//! some pulses raise the line for their duration so the leader sees
//! coincidences.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use cuwatch_core::{AnalogInput, Sample};

/// Gap used when pulses are disabled
const NEVER: Duration = Duration::from_secs(365 * 24 * 3600);

/// Parameters of the simulated detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// RNG seed; random when unset
    pub seed: Option<u64>,
    /// Quiet signal level in ADC counts
    pub baseline: f32,
    /// Half-width of the triangular baseline noise
    pub noise: f32,
    /// Mean pulse rate
    pub pulse_rate_hz: f64,
    /// Pulse height above baseline
    pub pulse_amplitude: f32,
    /// Pulse duration
    pub pulse_width_us: u64,
    /// Chance that the partner node sees the same particle
    pub coincidence_probability: f64,
    /// Temperature channel level in ADC counts
    pub temperature_adc: u16,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            baseline: 800.0,
            noise: 6.0,
            pulse_rate_hz: 2.0,
            pulse_amplitude: 2500.0,
            pulse_width_us: 20,
            coincidence_probability: 0.3,
            temperature_adc: 21_000,
        }
    }
}

impl SimulationConfig {
    fn rng(&self) -> StdRng {
        self.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }
}

// ============================================================================
// Coincidence Line
// ============================================================================

/// In-process stand-in for the shared coincidence wire.
#[derive(Clone, Debug, Default)]
pub struct SharedLine(Arc<AtomicBool>);

impl SharedLine {
    /// Current level
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Drive the line
    pub fn set(&self, high: bool) {
        self.0.store(high, Ordering::Relaxed);
    }
}

impl ErrorType for SharedLine {
    type Error = Infallible;
}

impl InputPin for SharedLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.is_set())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_set())
    }
}

impl OutputPin for SharedLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

// ============================================================================
// Signals
// ============================================================================

/// Noisy baseline with Poisson-timed pulses.
pub struct SimulatedSignal {
    config: SimulationConfig,
    rng: StdRng,
    next_pulse: Instant,
    pulse_end: Option<Instant>,
    partner: Option<SharedLine>,
    partner_high: bool,
}

impl SimulatedSignal {
    /// Create a signal; `partner` is the line a simulated paired node drives.
    #[must_use]
    pub fn new(config: SimulationConfig, partner: Option<SharedLine>) -> Self {
        let mut signal = Self {
            rng: config.rng(),
            config,
            next_pulse: Instant::now(),
            pulse_end: None,
            partner,
            partner_high: false,
        };
        let gap = signal.next_gap();
        signal.next_pulse += gap;
        signal
    }

    /// Exponentially distributed gap to the next pulse
    fn next_gap(&mut self) -> Duration {
        if self.config.pulse_rate_hz <= 0.0 {
            return NEVER;
        }
        // 1 - U lies in (0, 1], so the log is finite
        let u: f64 = 1.0 - self.rng.gen::<f64>();
        Duration::try_from_secs_f64(-u.ln() / self.config.pulse_rate_hz).unwrap_or(NEVER)
    }

    fn noise(&mut self) -> f32 {
        if self.config.noise <= 0.0 {
            return 0.0;
        }
        let half = self.config.noise;
        (self.rng.gen_range(-half..half) + self.rng.gen_range(-half..half)) / 2.0
    }

    fn in_pulse(&mut self, now: Instant) -> bool {
        if self.pulse_end.is_none() && now >= self.next_pulse {
            self.pulse_end = Some(now + Duration::from_micros(self.config.pulse_width_us));
            self.next_pulse = now + self.next_gap();
            let p = self.config.coincidence_probability.clamp(0.0, 1.0);
            self.partner_high = self.partner.is_some() && self.rng.gen_bool(p);
            if self.partner_high {
                if let Some(line) = &self.partner {
                    line.set(true);
                }
            }
        }

        match self.pulse_end {
            Some(end) if now < end => true,
            Some(_) => {
                self.pulse_end = None;
                if std::mem::take(&mut self.partner_high) {
                    if let Some(line) = &self.partner {
                        line.set(false);
                    }
                }
                false
            }
            None => false,
        }
    }
}

impl AnalogInput for SimulatedSignal {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn read(&mut self) -> Sample {
        let pulse = if self.in_pulse(Instant::now()) { self.config.pulse_amplitude } else { 0.0 };
        let level = self.config.baseline + pulse + self.noise();
        // Saturates like the ADC
        level.round().clamp(0.0, f32::from(Sample::MAX)) as Sample
    }
}

/// Temperature channel with a little jitter.
pub struct SimulatedTemperature {
    level: u16,
    rng: StdRng,
}

impl SimulatedTemperature {
    /// Create from the simulation parameters
    #[must_use]
    pub fn new(config: &SimulationConfig) -> Self {
        Self { level: config.temperature_adc, rng: config.rng() }
    }
}

impl AnalogInput for SimulatedTemperature {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn read(&mut self) -> Sample {
        let jitter: i32 = self.rng.gen_range(-8..=8);
        (i32::from(self.level) + jitter).clamp(0, i32::from(Sample::MAX)) as Sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SimulationConfig {
        SimulationConfig { seed: Some(7), pulse_rate_hz: 0.0, ..SimulationConfig::default() }
    }

    #[test]
    fn test_quiet_signal_stays_near_baseline() {
        let mut signal = SimulatedSignal::new(quiet(), None);
        for _ in 0..1_000 {
            let v = signal.read();
            assert!((794..=806).contains(&v), "sample {v} outside noise band");
        }
    }

    #[test]
    fn test_first_pulse_scheduled_at_creation() {
        let before = Instant::now();
        let quiet = SimulatedSignal::new(quiet(), None);
        assert!(quiet.next_pulse >= before + NEVER);

        let busy = SimulatedSignal::new(
            SimulationConfig { seed: Some(2), pulse_rate_hz: 5.0, ..SimulationConfig::default() },
            None,
        );
        assert!(busy.next_pulse > before);
        assert!(busy.pulse_end.is_none());
    }

    #[test]
    fn test_pulses_appear_and_raise_partner_line() {
        let line = SharedLine::default();
        let config = SimulationConfig {
            seed: Some(1),
            pulse_rate_hz: 10_000.0,
            pulse_width_us: 2_000,
            coincidence_probability: 1.0,
            ..SimulationConfig::default()
        };
        let mut signal = SimulatedSignal::new(config, Some(line.clone()));

        let deadline = Instant::now() + Duration::from_secs(1);
        let mut seen_with_line = false;
        while Instant::now() < deadline && !seen_with_line {
            seen_with_line = signal.read() > 2_000 && line.is_set();
        }
        assert!(seen_with_line);
    }

    #[test]
    fn test_shared_line_pins() {
        let mut output = SharedLine::default();
        let mut input = output.clone();
        assert!(input.is_low().unwrap());
        output.set_high().unwrap();
        assert!(input.is_high().unwrap());
        output.set_low().unwrap();
        assert!(!input.is_high().unwrap());
    }

    #[test]
    fn test_temperature_jitter() {
        let mut temp = SimulatedTemperature::new(&SimulationConfig { seed: Some(3), ..SimulationConfig::default() });
        for _ in 0..100 {
            assert!((20_992..=21_008).contains(&temp.read()));
        }
    }
}
