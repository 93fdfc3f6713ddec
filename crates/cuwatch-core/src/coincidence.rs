//! Leader/follower coincidence line protocol
//!
//! Two paired nodes share one digital line. The follower drives it high for
//! as long as its own pulse is above the reset level; the leader samples it on
//! trigger and on every reset-wait re-read, and latches a coincidence once it
//! sees the line high. The scheme is level triggered and best effort: a short
//! follower pulse that falls between the leader's samples is missed.
//!
//! The role and so the line direction are fixed for the lifetime of a run.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::types::Role;

/// Per-event hooks called by the event detector.
pub trait CoincidenceSync {
    /// Sample crossed the trigger level
    fn on_trigger(&mut self);

    /// One reset-wait re-read that was still above the release level
    fn on_wait_tick(&mut self);

    /// Pulse cleared (or timed out); returns the coincidence flag for the event
    fn on_release(&mut self) -> bool;
}

/// Coincidence state machine over a shared line.
#[derive(Debug)]
pub enum CoincidenceSynchronizer<I, O> {
    /// Reads the line and latches on a high level
    Leader {
        /// Line configured as input
        line: I,
        /// Line seen high during the current event
        latched: bool,
    },
    /// Drives the line while above threshold
    Follower {
        /// Line configured as output
        line: O,
    },
}

impl<I: InputPin, O: OutputPin> CoincidenceSynchronizer<I, O> {
    /// Leader reading `line`
    pub const fn leader(line: I) -> Self {
        Self::Leader { line, latched: false }
    }

    /// Follower driving `line`. The line is pulled low before the run starts.
    pub fn follower(mut line: O) -> Self {
        let _ = line.set_low();
        Self::Follower { line }
    }

    /// Role this synchronizer plays
    pub const fn role(&self) -> Role {
        match self {
            Self::Leader { .. } => Role::Leader,
            Self::Follower { .. } => Role::Follower,
        }
    }

    /// Check if the leader has latched a coincidence for the current event
    pub const fn is_latched(&self) -> bool {
        matches!(self, Self::Leader { latched: true, .. })
    }

    fn sample(line: &mut I, latched: &mut bool) {
        // Read errors count as a low line
        if !*latched && line.is_high().unwrap_or(false) {
            *latched = true;
        }
    }
}

impl<I: InputPin, O: OutputPin> CoincidenceSync for CoincidenceSynchronizer<I, O> {
    fn on_trigger(&mut self) {
        match self {
            Self::Leader { line, latched } => {
                *latched = false;
                Self::sample(line, latched);
            }
            Self::Follower { line } => {
                let _ = line.set_high();
            }
        }
    }

    fn on_wait_tick(&mut self) {
        if let Self::Leader { line, latched } = self {
            Self::sample(line, latched);
        }
    }

    fn on_release(&mut self) -> bool {
        match self {
            Self::Leader { latched, .. } => core::mem::take(latched),
            Self::Follower { line } => {
                let _ = line.set_low();
                false
            }
        }
    }
}

/// Placeholder pin for the unused direction of a synchronizer, or for a node
/// without a paired partner. Reads low, ignores writes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Unconnected;

impl ErrorType for Unconnected {
    type Error = Infallible;
}

impl InputPin for Unconnected {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

impl OutputPin for Unconnected {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
