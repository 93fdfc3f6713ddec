//! Control commands and telemetry topics
//!
//! Wire formats belong to the collaborators. By the time a command reaches
//! the core it is already one of these typed variants, and outgoing telemetry
//! leaves the core as a typed [`Telemetry`] value for the publisher to encode.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::telemetry::StatusSnapshot;
use crate::types::{HitEvent, Role};

/// Commands accepted from the external control channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "value", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Replace the trigger level
    SetThreshold(i32),
    /// Replace the release level
    SetResetThreshold(i32),
    /// Stop the run and stay down
    Shutdown,
    /// Stop the run and start a fresh one
    Restart,
    /// Persist a new role, effective from the next run
    SetRole(Role),
}

impl ControlCommand {
    /// Check if this command ends the current run
    #[must_use]
    pub const fn stops_run(&self) -> bool {
        matches!(self, Self::Shutdown | Self::Restart)
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetThreshold(v) => write!(f, "set threshold {v}"),
            Self::SetResetThreshold(v) => write!(f, "set reset threshold {v}"),
            Self::Shutdown => f.write_str("shutdown"),
            Self::Restart => f.write_str("restart"),
            Self::SetRole(role) => write!(f, "set role {role}"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ControlCommand {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Self::SetThreshold(v) => defmt::write!(f, "SetThreshold({})", v),
            Self::SetResetThreshold(v) => defmt::write!(f, "SetResetThreshold({})", v),
            Self::Shutdown => defmt::write!(f, "Shutdown"),
            Self::Restart => defmt::write!(f, "Restart"),
            Self::SetRole(role) => defmt::write!(f, "SetRole({})", role),
        }
    }
}

/// Why an acquisition run ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Shutdown requested over the control channel
    Shutdown,
    /// Restart requested over the control channel
    Restart,
    /// Local user switch pressed
    Switch,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shutdown => "shutdown",
            Self::Restart => "restart",
            Self::Switch => "switch",
        })
    }
}

/// Publish destinations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topic {
    /// One message per hit event
    Event,
    /// Periodic status snapshots
    Status,
}

impl Topic {
    /// Topic prefix; the collaborator appends the zero-padded device id
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Event => "telemetry",
            Self::Status => "status",
        }
    }
}

/// Outgoing telemetry payload, encoded by the publisher.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(untagged)]
pub enum Telemetry<'a> {
    /// A finished hit event
    Event(&'a HitEvent),
    /// A status snapshot
    Status(&'a StatusSnapshot),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_stop_commands() {
        assert!(ControlCommand::Shutdown.stops_run());
        assert!(ControlCommand::Restart.stops_run());
        assert!(!ControlCommand::SetThreshold(1200).stops_run());
        assert!(!ControlCommand::SetRole(Role::Follower).stops_run());
    }

    #[test]
    fn test_display() {
        assert_eq!(ControlCommand::SetThreshold(1200).to_string(), "set threshold 1200");
        assert_eq!(ControlCommand::SetRole(Role::Follower).to_string(), "set role follower");
        assert_eq!(StopReason::Switch.to_string(), "switch");
        assert_eq!(Topic::Status.prefix(), "status");
    }
}
