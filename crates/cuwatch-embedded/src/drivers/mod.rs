//! Hardware drivers for the detector node
//!
//! - [`ads1115`]: TI ADS1115 16-bit ADC as the detector input
//! - [`indicator`]: Activity and heartbeat LEDs

pub mod ads1115;
pub mod indicator;
