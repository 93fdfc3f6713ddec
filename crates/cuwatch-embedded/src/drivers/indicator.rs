//! Activity and heartbeat LEDs
//!
//! The activity LED is lit while a hit is being handled; the heartbeat LED
//! flips on every bookkeeping pass so a stalled loop is visible at a glance.
//! Both are cosmetic, so pin errors are ignored.

use embedded_hal::digital::OutputPin;

use cuwatch_core::ActivityIndicator;

/// LED pair driven by the acquisition loop
pub struct ActivityLeds<A, H> {
    activity: A,
    heartbeat: H,
    heartbeat_on: bool,
}

impl<A: OutputPin, H: OutputPin> ActivityLeds<A, H> {
    /// Create the indicator with both LEDs off
    pub fn new(mut activity: A, mut heartbeat: H) -> Self {
        let _ = activity.set_low();
        let _ = heartbeat.set_low();
        Self { activity, heartbeat, heartbeat_on: false }
    }

    /// Current heartbeat LED state
    pub fn heartbeat_on(&self) -> bool {
        self.heartbeat_on
    }

    /// Release the pins
    pub fn release(self) -> (A, H) {
        (self.activity, self.heartbeat)
    }
}

impl<A: OutputPin, H: OutputPin> ActivityIndicator for ActivityLeds<A, H> {
    fn set(&mut self, on: bool) {
        let _ = if on { self.activity.set_high() } else { self.activity.set_low() };
    }

    fn toggle_heartbeat(&mut self) {
        self.heartbeat_on = !self.heartbeat_on;
        let _ = if self.heartbeat_on {
            self.heartbeat.set_high()
        } else {
            self.heartbeat.set_low()
        };
    }
}
