//! CUWatch Embedded - microcontroller-side collaborators
//!
//! Concrete implementations of the acquisition core's capability traits on
//! top of `embedded-hal` 1.0:
//! - ADS1115 16-bit ADC over I2C as an [`AnalogInput`](cuwatch_core::AnalogInput)
//! - Activity and heartbeat LEDs as an [`ActivityIndicator`](cuwatch_core::ActivityIndicator)
//! - Interrupt-driven user switch flag
//!
//! The board crate wires these to its HAL: the switch's ISR calls
//! [`UserSwitch::on_rising_edge`], and [`UserSwitch::flag`] is handed to the
//! scheduler's `run`.
//!
//! # Pin Assignments (Pepper carrier board)
//!
//! ```text
//! Detector signal:   ADC0 (GP26)
//! Temperature:       ADC1 (GP27)
//! Coincidence line:  GP14 (input on leader, output on follower)
//! User switch:       GP16 (pull-down, rising edge)
//! Activity LED:      GP15
//! Heartbeat LED:     on-board LED
//! I2C (ADS1115):     SDA=GP4, SCL=GP5
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

#[cfg(test)]
extern crate std;

pub mod drivers;
pub mod switch;

pub use drivers::ads1115::{Ads1115Error, Ads1115Input, Channel, DataRate};
pub use drivers::indicator::ActivityLeds;
pub use switch::UserSwitch;
