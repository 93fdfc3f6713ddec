//! Error types for the CUWatch acquisition core
//!
//! Only two things can go wrong inside the core: a control command asks for
//! an invalid threshold, or the durable log stops accepting records. Degraded
//! events (reset-wait timeouts) and publish failures are not errors.

use core::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration Errors
// ============================================================================

/// A rejected threshold update or acquisition setting. The previous value
/// stays in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigError {
    /// New trigger level would sit below the release level
    ThresholdBelowReset {
        /// Requested trigger level
        requested: i32,
        /// Release level currently in effect
        reset_threshold: i32,
    },
    /// New release level would sit above the trigger level
    ResetAboveThreshold {
        /// Requested release level
        requested: i32,
        /// Trigger level currently in effect
        threshold: i32,
    },
    /// Value outside the sample range `0..=65535`
    OutOfRange {
        /// Requested value
        requested: i32,
    },
    /// Release offset above the trigger offset, or not a number
    ResetOffsetAboveTrigger,
    /// Ring buffer capacity outside `1..=max`
    CapacityOutOfRange {
        /// Requested capacity
        requested: usize,
        /// Largest supported capacity
        max: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdBelowReset { requested, reset_threshold } => {
                write!(
                    f,
                    "New threshold {requested} cannot be below reset threshold {reset_threshold}"
                )
            }
            Self::ResetAboveThreshold { requested, threshold } => {
                write!(
                    f,
                    "New reset threshold {requested} cannot be above threshold {threshold}"
                )
            }
            Self::OutOfRange { requested } => {
                write!(f, "Threshold {requested} outside sample range 0..=65535")
            }
            Self::ResetOffsetAboveTrigger => {
                f.write_str("Reset offset must not exceed the trigger offset")
            }
            Self::CapacityOutOfRange { requested, max } => {
                write!(f, "Buffer capacity {requested} outside 1..={max}")
            }
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ConfigError {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::ThresholdBelowReset { requested, reset_threshold } => {
                defmt::write!(f, "threshold {} < reset {}", requested, reset_threshold);
            }
            Self::ResetAboveThreshold { requested, threshold } => {
                defmt::write!(f, "reset {} > threshold {}", requested, threshold);
            }
            Self::OutOfRange { requested } => {
                defmt::write!(f, "threshold {} out of range", requested);
            }
            Self::ResetOffsetAboveTrigger => {
                defmt::write!(f, "reset offset above trigger offset");
            }
            Self::CapacityOutOfRange { requested, max } => {
                defmt::write!(f, "capacity {} outside 1..={}", requested, max);
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

// ============================================================================
// Acquisition Errors
// ============================================================================

/// Fatal errors that end an acquisition run.
///
/// `E` is the durable log's own error type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError<E> {
    /// The durable log rejected an append, flush or sync
    DurableLog(E),
}

impl<E: fmt::Debug> fmt::Display for AcquisitionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DurableLog(e) => write!(f, "Durable log unwritable: {e:?}"),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E: defmt::Format> defmt::Format for AcquisitionError<E> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::DurableLog(e) => defmt::write!(f, "Durable log unwritable: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl<E: fmt::Debug> std::error::Error for AcquisitionError<E> {}
