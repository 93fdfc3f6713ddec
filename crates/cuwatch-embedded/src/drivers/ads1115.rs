//! ADS1115 Detector Input Driver
//!
//! Reads the detector signal through a TI ADS1115 16-bit ADC on boards where
//! the MCU's own ADC is not used. The converter runs in continuous mode so a
//! read is a single conversion-register fetch and never waits for a
//! conversion to finish.
//!
//! # Scaling
//!
//! The ADS1115 returns a signed 16-bit result. For a single-ended input only
//! the positive half is meaningful; negative readings clamp to 0 and the
//! result is shifted left once so it spans the full `u16` sample range the
//! core's thresholds are expressed in.
//!
//! # Example
//!
//! ```ignore
//! let mut signal = Ads1115Input::new(i2c, 0x48, Channel::Ain0)
//!     .with_data_rate(DataRate::Sps860);
//! signal.start_continuous()?;
//! let sample = signal.read();
//! ```

use core::fmt;

use embedded_hal::i2c::I2c;

use cuwatch_core::{AnalogInput, Sample};

/// ADS1115 register addresses
mod register {
    pub const CONVERSION: u8 = 0x00;
    pub const CONFIG: u8 = 0x01;
}

/// ADS1115 configuration bits
mod config {
    /// Programmable gain: ±4.096V
    pub const PGA_4V: u16 = 0x0200;
    /// Continuous conversion mode (MODE bit clear)
    pub const MODE_CONTINUOUS: u16 = 0x0000;
    /// Comparator disable
    pub const COMP_DISABLE: u16 = 0x0003;
}

/// Driver error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ads1115Error<E> {
    /// I2C communication error
    I2c(E),
}

impl<E: fmt::Debug> fmt::Display for Ads1115Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(e) => write!(f, "I2C error: {e:?}"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for Ads1115Error<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::I2c(e) => defmt::write!(f, "I2C error: {}", e),
        }
    }
}

/// Single-ended input channel
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Channel {
    /// AIN0 against GND
    #[default]
    Ain0,
    /// AIN1 against GND
    Ain1,
    /// AIN2 against GND
    Ain2,
    /// AIN3 against GND
    Ain3,
}

impl Channel {
    fn mux_bits(self) -> u16 {
        match self {
            Self::Ain0 => 0x4000,
            Self::Ain1 => 0x5000,
            Self::Ain2 => 0x6000,
            Self::Ain3 => 0x7000,
        }
    }
}

/// Conversion rate
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DataRate {
    /// 8 samples per second
    Sps8,
    /// 16 samples per second
    Sps16,
    /// 32 samples per second
    Sps32,
    /// 64 samples per second
    Sps64,
    /// 128 samples per second
    Sps128,
    /// 250 samples per second
    Sps250,
    /// 475 samples per second
    Sps475,
    /// 860 samples per second
    #[default]
    Sps860,
}

impl DataRate {
    fn config_bits(self) -> u16 {
        match self {
            Self::Sps8 => 0x0000,
            Self::Sps16 => 0x0020,
            Self::Sps32 => 0x0040,
            Self::Sps64 => 0x0060,
            Self::Sps128 => 0x0080,
            Self::Sps250 => 0x00A0,
            Self::Sps475 => 0x00C0,
            Self::Sps860 => 0x00E0,
        }
    }

    /// Rate in Hz
    pub fn hz(self) -> u16 {
        match self {
            Self::Sps8 => 8,
            Self::Sps16 => 16,
            Self::Sps32 => 32,
            Self::Sps64 => 64,
            Self::Sps128 => 128,
            Self::Sps250 => 250,
            Self::Sps475 => 475,
            Self::Sps860 => 860,
        }
    }
}

/// ADS1115 in continuous mode as an analog input
pub struct Ads1115Input<I2C> {
    i2c: I2C,
    addr: u8,
    channel: Channel,
    rate: DataRate,
    /// Last successful conversion, repeated on bus errors
    last: Sample,
    errors: u32,
}

impl<I2C, E> Ads1115Input<I2C>
where
    I2C: I2c<Error = E>,
{
    /// Create a new driver
    ///
    /// # Arguments
    ///
    /// * `i2c` - I2C bus
    /// * `addr` - ADS1115 I2C address (0x48-0x4B)
    /// * `channel` - Input the detector is wired to
    #[must_use]
    pub fn new(i2c: I2C, addr: u8, channel: Channel) -> Self {
        Self {
            i2c,
            addr,
            channel,
            rate: DataRate::default(),
            last: 0,
            errors: 0,
        }
    }

    /// Set the conversion rate (applied by `start_continuous`)
    #[must_use]
    pub fn with_data_rate(mut self, rate: DataRate) -> Self {
        self.rate = rate;
        self
    }

    /// Put the converter into continuous mode on the configured channel
    pub fn start_continuous(&mut self) -> Result<(), Ads1115Error<E>> {
        let config = self.channel.mux_bits()
            | config::PGA_4V
            | config::MODE_CONTINUOUS
            | self.rate.config_bits()
            | config::COMP_DISABLE;
        let bytes = config.to_be_bytes();
        self.i2c
            .write(self.addr, &[register::CONFIG, bytes[0], bytes[1]])
            .map_err(Ads1115Error::I2c)
    }

    /// Fetch the latest conversion
    pub fn try_read(&mut self) -> Result<Sample, Ads1115Error<E>> {
        let mut buf = [0u8; 2];
        self.i2c
            .write_read(self.addr, &[register::CONVERSION], &mut buf)
            .map_err(Ads1115Error::I2c)?;
        Ok(scale(i16::from_be_bytes(buf)))
    }

    /// Bus errors absorbed by [`AnalogInput::read`]
    pub fn error_count(&self) -> u32 {
        self.errors
    }

    /// Release the I2C bus
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> AnalogInput for Ads1115Input<I2C> {
    /// Latest conversion, or the previous one if the bus read failed.
    fn read(&mut self) -> Sample {
        match self.try_read() {
            Ok(sample) => {
                self.last = sample;
                sample
            }
            Err(_) => {
                self.errors = self.errors.saturating_add(1);
                self.last
            }
        }
    }
}

fn scale(raw: i16) -> Sample {
    (raw.max(0) as u16) << 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BusFault;

    impl embedded_hal::i2c::Error for BusFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    /// Bus replaying conversion results; `None` entries fail the transfer.
    #[derive(Default)]
    struct MockBus {
        conversions: Vec<Option<[u8; 2]>>,
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl ErrorType for MockBus {
        type Error = BusFault;
    }

    impl I2c for MockBus {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            for op in operations {
                match op {
                    Operation::Write(bytes) => self.writes.push((address, bytes.to_vec())),
                    Operation::Read(buf) => {
                        let next = if self.conversions.is_empty() {
                            None
                        } else {
                            self.conversions.remove(0)
                        };
                        buf.copy_from_slice(&next.ok_or(BusFault)?);
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_start_continuous_writes_config() {
        let mut adc = Ads1115Input::new(MockBus::default(), 0x48, Channel::Ain1)
            .with_data_rate(DataRate::Sps475);
        adc.start_continuous().unwrap();
        let bus = adc.release();
        // MUX=AIN1, PGA=4.096V, continuous, 475 SPS, comparator off
        assert_eq!(bus.writes, [(0x48, Vec::from([0x01, 0x52, 0xC3]))]);
    }

    #[test]
    fn test_read_scales_to_sample_range() {
        let bus = MockBus {
            conversions: Vec::from([Some([0x7F, 0xFF]), Some([0x10, 0x00]), Some([0xFF, 0x00])]),
            ..MockBus::default()
        };
        let mut adc = Ads1115Input::new(bus, 0x48, Channel::Ain0);
        assert_eq!(adc.read(), 0xFFFE);
        assert_eq!(adc.read(), 0x2000);
        // negative reading clamps to zero
        assert_eq!(adc.read(), 0);
    }

    #[test]
    fn test_bus_error_repeats_last_sample() {
        let bus = MockBus {
            conversions: Vec::from([Some([0x01, 0x00]), None]),
            ..MockBus::default()
        };
        let mut adc = Ads1115Input::new(bus, 0x49, Channel::Ain0);
        assert_eq!(adc.read(), 0x0200);
        assert_eq!(adc.read(), 0x0200);
        assert_eq!(adc.error_count(), 1);
        assert_eq!(adc.try_read(), Err(Ads1115Error::I2c(BusFault)));
    }

    #[test]
    fn test_data_rate_hz() {
        assert_eq!(DataRate::default().hz(), 860);
        assert_eq!(DataRate::Sps8.hz(), 8);
    }
}
