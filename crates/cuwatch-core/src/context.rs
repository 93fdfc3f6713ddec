//! Run-scoped detector state
//!
//! One `DetectorContext` exists per acquisition run and is owned by the
//! scheduler. The live thresholds only change through the validated setters
//! below, which the scheduler drives from drained control commands.

use crate::error::ConfigError;
use crate::protocol::{ControlCommand, StopReason};
use crate::types::{Role, RunCalibration, Thresholds, SAMPLE_MAX};

/// Calibration, live thresholds and pending stop/role requests for a run.
#[derive(Clone, Debug)]
pub struct DetectorContext {
    calibration: RunCalibration,
    thresholds: Thresholds,
    role: Role,
    requested_role: Option<Role>,
    stop: Option<StopReason>,
}

impl DetectorContext {
    /// Start a run from its calibration
    #[must_use]
    pub fn new(calibration: RunCalibration) -> Self {
        let thresholds = calibration.thresholds();
        let role = calibration.role();
        Self {
            calibration,
            thresholds,
            role,
            requested_role: None,
            stop: None,
        }
    }

    /// Thresholds in effect
    #[inline]
    #[must_use]
    pub const fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Calibration with the live thresholds folded in
    #[must_use]
    pub const fn calibration(&self) -> &RunCalibration {
        &self.calibration
    }

    /// Role of this run
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Role to use from the next run, if one was requested
    #[must_use]
    pub const fn requested_role(&self) -> Option<Role> {
        self.requested_role
    }

    /// Pending stop request
    #[must_use]
    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stop
    }

    /// Request the run to end. The first request wins.
    pub fn request_stop(&mut self, reason: StopReason) {
        self.stop.get_or_insert(reason);
    }

    /// Replace the trigger level.
    ///
    /// # Errors
    ///
    /// Rejects values outside `0..=65535` or below the current release level.
    pub fn set_threshold(&mut self, value: i32) -> Result<(), ConfigError> {
        check_range(value)?;
        if value < self.thresholds.reset_threshold {
            return Err(ConfigError::ThresholdBelowReset {
                requested: value,
                reset_threshold: self.thresholds.reset_threshold,
            });
        }
        self.thresholds.threshold = value;
        self.calibration.threshold = value;
        Ok(())
    }

    /// Replace the release level.
    ///
    /// # Errors
    ///
    /// Rejects values outside `0..=65535` or above the current trigger level.
    pub fn set_reset_threshold(&mut self, value: i32) -> Result<(), ConfigError> {
        check_range(value)?;
        if value > self.thresholds.threshold {
            return Err(ConfigError::ResetAboveThreshold {
                requested: value,
                threshold: self.thresholds.threshold,
            });
        }
        self.thresholds.reset_threshold = value;
        self.calibration.reset_threshold = value;
        Ok(())
    }

    /// Apply one control command.
    ///
    /// # Errors
    ///
    /// Returns the setter's [`ConfigError`] for a rejected threshold; the
    /// previous value stays in effect.
    pub fn apply(&mut self, command: ControlCommand) -> Result<(), ConfigError> {
        match command {
            ControlCommand::SetThreshold(value) => self.set_threshold(value),
            ControlCommand::SetResetThreshold(value) => self.set_reset_threshold(value),
            ControlCommand::Shutdown => {
                self.request_stop(StopReason::Shutdown);
                Ok(())
            }
            ControlCommand::Restart => {
                self.request_stop(StopReason::Restart);
                Ok(())
            }
            ControlCommand::SetRole(role) => {
                self.requested_role = Some(role);
                Ok(())
            }
        }
    }
}

fn check_range(value: i32) -> Result<(), ConfigError> {
    if (0..=SAMPLE_MAX).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { requested: value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IsoTimestamp;

    fn context() -> DetectorContext {
        // threshold 1800, reset 850
        DetectorContext::new(RunCalibration::from_baseline(
            800.0,
            3.0,
            1000.0,
            50.0,
            IsoTimestamp::new(),
            Role::Leader,
        ))
    }

    #[test]
    fn test_threshold_below_reset_rejected() {
        let mut ctx = context();
        let err = ctx.set_threshold(800).unwrap_err();
        assert_eq!(err, ConfigError::ThresholdBelowReset { requested: 800, reset_threshold: 850 });
        assert_eq!(ctx.thresholds().threshold, 1800);
    }

    #[test]
    fn test_threshold_accepted() {
        let mut ctx = context();
        ctx.apply(ControlCommand::SetThreshold(1200)).unwrap();
        assert_eq!(ctx.thresholds(), Thresholds::new(1200, 850));
        assert_eq!(ctx.calibration().threshold, 1200);
    }

    #[test]
    fn test_threshold_equal_to_reset_accepted() {
        let mut ctx = context();
        assert!(ctx.set_threshold(850).is_ok());
    }

    #[test]
    fn test_reset_above_threshold_rejected() {
        let mut ctx = context();
        let err = ctx.apply(ControlCommand::SetResetThreshold(1900)).unwrap_err();
        assert_eq!(err, ConfigError::ResetAboveThreshold { requested: 1900, threshold: 1800 });
        assert_eq!(ctx.thresholds().reset_threshold, 850);
        ctx.apply(ControlCommand::SetResetThreshold(900)).unwrap();
        assert_eq!(ctx.thresholds().reset_threshold, 900);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut ctx = context();
        assert_eq!(
            ctx.set_threshold(70_000),
            Err(ConfigError::OutOfRange { requested: 70_000 })
        );
        assert_eq!(ctx.set_reset_threshold(-1), Err(ConfigError::OutOfRange { requested: -1 }));
        assert_eq!(ctx.thresholds(), Thresholds::new(1800, 850));
    }

    #[test]
    fn test_stop_and_role_requests() {
        let mut ctx = context();
        ctx.apply(ControlCommand::SetRole(Role::Follower)).unwrap();
        assert_eq!(ctx.role(), Role::Leader);
        assert_eq!(ctx.requested_role(), Some(Role::Follower));

        assert_eq!(ctx.stop_reason(), None);
        ctx.apply(ControlCommand::Restart).unwrap();
        ctx.apply(ControlCommand::Shutdown).unwrap();
        assert_eq!(ctx.stop_reason(), Some(StopReason::Restart));
    }
}
