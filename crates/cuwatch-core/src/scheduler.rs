//! Cooperative acquisition loop
//!
//! One logical thread runs the hot loop below; background work (status
//! serving, publishing, control intake) only gets to run while the loop is
//! suspended in [`Cooperative::yield_now`].
//!
//! Per iteration:
//!
//! 1. Bookkeeping every `inner_iterations` (rate, status board, heartbeat),
//!    flush + sync of the durable log every `inner_iterations * outer_multiplier`
//! 2. Sample and run the event detector
//! 3. On a hit: read the secondary channel, stamp the first event with the
//!    wall clock, aggregate, hand off to the sink
//! 4. Yield right after a reset-wait timeout, otherwise every `yield_every`
//!    iterations
//! 5. Drain control commands, check the stop and switch flags

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;
use serde::{Deserialize, Serialize};

use crate::calibration::calibrate;
use crate::coincidence::CoincidenceSync;
use crate::context::DetectorContext;
use crate::detector::{EventDetector, DEFAULT_WAIT_BUDGET};
use crate::error::{AcquisitionError, ConfigError};
use crate::hal::{
    ActivityIndicator, AnalogInput, ControlSource, Cooperative, MonotonicClock, StatusSink,
    WallClock, YieldPoint,
};
use crate::protocol::StopReason;
use crate::sink::EventSink;
use crate::telemetry::{
    TelemetryAggregator, DEFAULT_RATE_CADENCE_MS, MAX_INTERVAL_CAPACITY, MAX_RATE_CAPACITY,
};
use crate::types::{Role, RunCalibration};

// ============================================================================
// Configuration
// ============================================================================

/// Iteration counts driving the loop's periodic work.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerBudget {
    /// Iterations between bookkeeping passes
    pub inner_iterations: u32,
    /// Bookkeeping passes between durable log flushes
    pub outer_multiplier: u32,
    /// Iterations between periodic yields
    pub yield_every: u32,
}

impl Default for SchedulerBudget {
    fn default() -> Self {
        Self {
            inner_iterations: 400_000,
            outer_multiplier: 20,
            yield_every: 3_000,
        }
    }
}

impl SchedulerBudget {
    /// Iterations between durable log flushes
    #[must_use]
    pub const fn flush_every(&self) -> u64 {
        self.inner_iterations as u64 * self.outer_multiplier as u64
    }
}

/// Tunables for one acquisition run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Reset-wait budget in re-reads
    pub wait_budget: u16,
    /// Loop iteration budget
    pub budget: SchedulerBudget,
    /// Interval between rate history pushes
    pub rate_cadence_ms: u32,
    /// Inter-event intervals averaged for the rate
    pub interval_capacity: usize,
    /// Rate history length
    pub rate_capacity: usize,
    /// Samples taken during calibration
    pub calibration_samples: u32,
    /// Pause between calibration samples
    pub calibration_pacing_ms: u32,
    /// Trigger level above baseline
    pub trigger_offset: f32,
    /// Release level above baseline
    pub reset_offset: f32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            wait_budget: DEFAULT_WAIT_BUDGET,
            budget: SchedulerBudget::default(),
            rate_cadence_ms: DEFAULT_RATE_CADENCE_MS,
            interval_capacity: 50,
            rate_capacity: 120,
            calibration_samples: 500,
            calibration_pacing_ms: 10,
            trigger_offset: 1000.0,
            reset_offset: 50.0,
        }
    }
}

impl AcquisitionConfig {
    /// Check the settings a run cannot repair on its own.
    ///
    /// The reset offset must not exceed the trigger offset, so the derived
    /// levels keep `reset_threshold <= threshold`. Ring capacities must fit
    /// the aggregator's backing arrays.
    ///
    /// # Errors
    ///
    /// The first offending setting as a [`ConfigError`].
    #[allow(clippy::neg_cmp_op_on_partial_ord)]
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Written so that NaN offsets fail too
        if !(self.reset_offset <= self.trigger_offset) {
            return Err(ConfigError::ResetOffsetAboveTrigger);
        }
        check_capacity(self.interval_capacity, MAX_INTERVAL_CAPACITY)?;
        check_capacity(self.rate_capacity, MAX_RATE_CAPACITY)
    }
}

fn check_capacity(requested: usize, max: usize) -> Result<(), ConfigError> {
    if (1..=max).contains(&requested) {
        Ok(())
    } else {
        Err(ConfigError::CapacityOutOfRange { requested, max })
    }
}

// ============================================================================
// Frontend
// ============================================================================

/// The analog side of the node.
#[derive(Debug)]
pub struct Frontend<S, T, D, C, L = ()> {
    /// Detector signal
    pub signal: S,
    /// Secondary (temperature) channel
    pub secondary: T,
    /// Blocking delay for the reset-wait pause and calibration pacing
    pub delay: D,
    /// Monotonic and wall clock
    pub clock: C,
    /// Activity LED
    pub indicator: L,
}

/// Why and how a run ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// Stop request that ended the run
    pub reason: StopReason,
    /// Loop iterations completed
    pub iterations: u64,
    /// Hits detected
    pub muon_count: u64,
    /// Hits whose reset-wait budget ran out
    pub waited: u32,
    /// Role requested for the next run
    pub requested_role: Option<Role>,
}

// ============================================================================
// Scheduler
// ============================================================================

/// Owns every piece of run state and drives the acquisition loop.
pub struct CooperativeScheduler<S, T, D, C, L, Y> {
    frontend: Frontend<S, T, D, C, L>,
    sync: Y,
    detector: EventDetector,
    aggregator: TelemetryAggregator,
    context: DetectorContext,
    config: AcquisitionConfig,
}

impl<S, T, D, C, L, Y> CooperativeScheduler<S, T, D, C, L, Y>
where
    S: AnalogInput,
    T: AnalogInput,
    D: DelayNs,
    C: MonotonicClock + WallClock,
    L: ActivityIndicator,
    Y: CoincidenceSync,
{
    /// Set up a run from an existing calibration.
    pub fn new(
        frontend: Frontend<S, T, D, C, L>,
        sync: Y,
        calibration: RunCalibration,
        config: &AcquisitionConfig,
    ) -> Self {
        let start_ms = frontend.clock.now_ms();
        Self {
            detector: EventDetector::new(config.wait_budget, start_ms),
            aggregator: TelemetryAggregator::new(
                config.interval_capacity,
                config.rate_capacity,
                config.rate_cadence_ms,
                start_ms,
            ),
            context: DetectorContext::new(calibration),
            frontend,
            sync,
            config: *config,
        }
    }

    /// Calibrate the quiet detector, then set up the run.
    ///
    /// `config` is expected to have passed [`AcquisitionConfig::validate`].
    pub fn calibrated(
        mut frontend: Frontend<S, T, D, C, L>,
        sync: Y,
        role: Role,
        config: &AcquisitionConfig,
    ) -> Self {
        let stats = calibrate(
            &mut frontend.signal,
            &mut frontend.delay,
            config.calibration_samples,
            config.calibration_pacing_ms,
        );
        let calibration = stats.into_calibration(
            config.trigger_offset,
            config.reset_offset,
            frontend.clock.now_iso8601(),
            role,
        );
        Self::new(frontend, sync, calibration, config)
    }

    /// Run until a stop request.
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::DurableLog`] if the sink cannot record an event or
    /// flush; the run ends immediately.
    pub async fn run<K, Q, U, Z>(
        &mut self,
        sink: &mut K,
        control: &mut Q,
        status: &mut U,
        yielder: &mut Z,
        switch: &AtomicBool,
    ) -> Result<RunSummary, AcquisitionError<K::Error>>
    where
        K: EventSink + ?Sized,
        Q: ControlSource + ?Sized,
        U: StatusSink + ?Sized,
        Z: Cooperative + ?Sized,
    {
        let budget = self.config.budget;
        let inner = u64::from(budget.inner_iterations.max(1));
        let flush_every = budget.flush_every().max(1);
        let yield_every = u64::from(budget.yield_every.max(1));

        let mut iteration: u64 = 0;
        let mut since_bookkeeping: u32 = 0;
        let mut first_event = true;

        self.publish_status(status);

        let reason = loop {
            iteration += 1;
            since_bookkeeping += 1;

            if iteration % inner == 0 {
                let now = self.frontend.clock.now_ms();
                self.aggregator.bookkeeping(now, since_bookkeeping);
                since_bookkeeping = 0;
                self.publish_status(status);
                self.frontend.indicator.toggle_heartbeat();
                if iteration % flush_every == 0 {
                    sink.flush_and_sync().map_err(AcquisitionError::DurableLog)?;
                }
            }

            let sample = self.frontend.signal.read();
            let now = self.frontend.clock.now_ms();
            let thresholds = self.context.thresholds();

            let mut timed_out = false;
            if let Some(mut event) = self.detector.process(
                sample,
                now,
                thresholds,
                &mut self.frontend.signal,
                &mut self.sync,
                &mut self.frontend.delay,
            ) {
                self.frontend.indicator.set(true);
                event.secondary_sample = self.frontend.secondary.read();
                if first_event {
                    event.wall_clock = Some(self.frontend.clock.now_iso8601());
                    first_event = false;
                }
                timed_out = event.timed_out();
                self.aggregator.record_event(&event);
                sink.record(&event).map_err(AcquisitionError::DurableLog)?;
                sink.publish_event(&event);
                self.frontend.indicator.set(false);
            }

            if timed_out {
                yielder.yield_now(YieldPoint::ResetTimeout).await;
            } else if iteration % yield_every == 0 {
                yielder.yield_now(YieldPoint::Periodic).await;
            }

            while let Some(command) = control.next_command() {
                let outcome = self.context.apply(command);
                control.report(command, outcome);
            }

            if switch.load(Ordering::Relaxed) {
                self.context.request_stop(StopReason::Switch);
            }
            if let Some(reason) = self.context.stop_reason() {
                break reason;
            }
        };

        sink.flush_and_sync().map_err(AcquisitionError::DurableLog)?;

        Ok(RunSummary {
            reason,
            iterations: iteration,
            muon_count: self.aggregator.muon_count(),
            waited: self.detector.waited(),
            requested_role: self.context.requested_role(),
        })
    }

    fn publish_status<U: StatusSink + ?Sized>(&self, status: &mut U) {
        let snapshot = self.aggregator.status(&self.context);
        status.update(&snapshot, &self.aggregator.rate_history());
    }

    /// Run state: calibration, thresholds, pending requests
    pub const fn context(&self) -> &DetectorContext {
        &self.context
    }

    /// Counters and rate series
    pub const fn aggregator(&self) -> &TelemetryAggregator {
        &self.aggregator
    }

    /// Hand the hardware back, e.g. to set up the next run.
    pub fn into_frontend(self) -> Frontend<S, T, D, C, L> {
        self.frontend
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coincidence::{CoincidenceSynchronizer, Unconnected};
    use crate::error::ConfigError;
    use crate::protocol::ControlCommand;
    use crate::sink::tests::{FlakyPublisher, MemoryLog};
    use crate::sink::RecordingSink;
    use crate::telemetry::StatusSnapshot;
    use crate::types::{IsoTimestamp, Thresholds};
    use core::cell::Cell;
    use std::collections::VecDeque;
    use std::vec::Vec;

    fn block_on<F: core::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    /// Repeating sample pattern.
    struct Pattern {
        values: Vec<u16>,
        pos: usize,
    }

    impl Pattern {
        fn new(values: &[u16]) -> Self {
            Self { values: values.to_vec(), pos: 0 }
        }
    }

    impl AnalogInput for Pattern {
        fn read(&mut self) -> u16 {
            let v = self.values[self.pos % self.values.len()];
            self.pos += 1;
            v
        }
    }

    struct Constant(u16);

    impl AnalogInput for Constant {
        fn read(&mut self) -> u16 {
            self.0
        }
    }

    struct NoDelay;

    impl DelayNs for NoDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    /// Advances one millisecond per reading.
    #[derive(Default)]
    struct StepClock {
        now: Cell<u32>,
    }

    impl MonotonicClock for StepClock {
        fn now_ms(&self) -> u32 {
            let now = self.now.get() + 1;
            self.now.set(now);
            now
        }
    }

    impl WallClock for StepClock {
        fn now_iso8601(&self) -> IsoTimestamp {
            IsoTimestamp::try_from("2024-05-01T12:00:00.000000+00:00").unwrap()
        }
    }

    #[derive(Default)]
    struct CountingYield {
        periodic: u32,
        timeouts: u32,
    }

    impl Cooperative for CountingYield {
        async fn yield_now(&mut self, point: YieldPoint) {
            match point {
                YieldPoint::Periodic => self.periodic += 1,
                YieldPoint::ResetTimeout => self.timeouts += 1,
            }
        }
    }

    /// Releases each queued command once `after` idle polls have passed.
    #[derive(Default)]
    struct ScriptedControl {
        queue: VecDeque<(u32, ControlCommand)>,
        idle_polls: u32,
        reports: Vec<(ControlCommand, Result<(), ConfigError>)>,
    }

    impl ScriptedControl {
        fn new(commands: &[(u32, ControlCommand)]) -> Self {
            Self { queue: commands.iter().copied().collect(), ..Self::default() }
        }
    }

    impl ControlSource for ScriptedControl {
        fn next_command(&mut self) -> Option<ControlCommand> {
            match self.queue.front() {
                Some(&(after, command)) if self.idle_polls >= after => {
                    self.queue.pop_front();
                    Some(command)
                }
                _ => {
                    self.idle_polls += 1;
                    None
                }
            }
        }

        fn report(&mut self, command: ControlCommand, outcome: Result<(), ConfigError>) {
            self.reports.push((command, outcome));
        }
    }

    #[derive(Default)]
    struct Board {
        updates: u32,
        last: Option<StatusSnapshot>,
    }

    impl StatusSink for Board {
        fn update(&mut self, snapshot: &StatusSnapshot, _rate_history: &[f32]) {
            self.updates += 1;
            self.last = Some(snapshot.clone());
        }
    }

    type TestScheduler = CooperativeScheduler<
        Pattern,
        Constant,
        NoDelay,
        StepClock,
        (),
        CoincidenceSynchronizer<Unconnected, Unconnected>,
    >;

    fn config(wait_budget: u16) -> AcquisitionConfig {
        AcquisitionConfig {
            wait_budget,
            budget: SchedulerBudget { inner_iterations: 10, outer_multiplier: 2, yield_every: 4 },
            ..AcquisitionConfig::default()
        }
    }

    /// Threshold 1800, reset 850.
    fn scheduler(pattern: &[u16], config: &AcquisitionConfig) -> TestScheduler {
        let frontend = Frontend {
            signal: Pattern::new(pattern),
            secondary: Constant(2100),
            delay: NoDelay,
            clock: StepClock::default(),
            indicator: (),
        };
        let calibration = RunCalibration::from_baseline(
            800.0,
            5.0,
            1000.0,
            50.0,
            IsoTimestamp::new(),
            Role::Leader,
        );
        CooperativeScheduler::new(
            frontend,
            CoincidenceSynchronizer::leader(Unconnected),
            calibration,
            config,
        )
    }

    /// One pulse every four iterations: trigger, one re-read below reset,
    /// then three quiet samples.
    const PULSE_EVERY_FOURTH: [u16; 5] = [2000, 500, 500, 500, 500];

    #[test]
    fn test_runs_until_shutdown() {
        let mut sched = scheduler(&PULSE_EVERY_FOURTH, &config(150));
        let mut sink = RecordingSink::new(MemoryLog::default(), FlakyPublisher::default());
        let mut control = ScriptedControl::new(&[(20, ControlCommand::Shutdown)]);
        let mut board = Board::default();
        let mut yielder = CountingYield::default();
        let switch = AtomicBool::new(false);

        let summary = block_on(sched.run(&mut sink, &mut control, &mut board, &mut yielder, &switch))
            .unwrap();

        assert_eq!(summary.reason, StopReason::Shutdown);
        assert_eq!(summary.iterations, 21);
        assert_eq!(summary.muon_count, 6);
        assert_eq!(summary.waited, 0);
        assert_eq!(summary.requested_role, None);

        let log = sink.log();
        assert_eq!(log.events.len(), 6);
        let sequences: Vec<u64> = log.events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, [1, 2, 3, 4, 5, 6]);
        assert!(log.events[0].wall_clock.is_some());
        assert!(log.events[1..].iter().all(|e| e.wall_clock.is_none()));
        assert!(log.events.iter().all(|e| e.secondary_sample == 2100));
        assert!(log.events.iter().all(|e| e.wait_count == 150));
        // one flush at iteration 20, one on exit
        assert_eq!((log.flushes, log.syncs), (2, 2));
        assert_eq!(sink.publish_failures(), 3);

        assert_eq!(yielder.periodic, 5);
        assert_eq!(yielder.timeouts, 0);
        // run start plus iterations 10 and 20
        assert_eq!(board.updates, 3);
        assert_eq!(board.last.unwrap().iteration_count, 20);
        assert_eq!(control.reports, [(ControlCommand::Shutdown, Ok(()))]);
    }

    #[test]
    fn test_timeouts_yield_and_count() {
        let mut sched = scheduler(&[2000], &config(3));
        let mut sink = RecordingSink::new(MemoryLog::default(), ());
        let mut control = ScriptedControl::new(&[(2, ControlCommand::Shutdown)]);
        let mut yielder = CountingYield::default();

        let summary =
            block_on(sched.run(&mut sink, &mut control, &mut (), &mut yielder, &AtomicBool::new(false)))
                .unwrap();

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.waited, 3);
        assert_eq!(yielder.timeouts, 3);
        assert_eq!(yielder.periodic, 0);
        assert!(sink.log().events.iter().all(|e| e.timed_out()));
        assert_eq!(sched.aggregator().waited(), 3);
    }

    #[test]
    fn test_threshold_commands_validated_in_loop() {
        let mut sched = scheduler(&PULSE_EVERY_FOURTH, &config(150));
        let mut sink = RecordingSink::new(MemoryLog::default(), ());
        let mut control = ScriptedControl::new(&[
            (0, ControlCommand::SetThreshold(100)),
            (0, ControlCommand::SetThreshold(2500)),
            (8, ControlCommand::Shutdown),
        ]);

        let summary = block_on(sched.run(
            &mut sink,
            &mut control,
            &mut (),
            &mut CountingYield::default(),
            &AtomicBool::new(false),
        ))
        .unwrap();

        assert_eq!(
            control.reports,
            [
                (
                    ControlCommand::SetThreshold(100),
                    Err(ConfigError::ThresholdBelowReset { requested: 100, reset_threshold: 850 })
                ),
                (ControlCommand::SetThreshold(2500), Ok(())),
                (ControlCommand::Shutdown, Ok(())),
            ]
        );
        assert_eq!(sched.context().thresholds(), Thresholds::new(2500, 850));
        // only the pulse sampled before the update was above the old level
        assert_eq!(summary.iterations, 9);
        assert_eq!(summary.muon_count, 1);
    }

    #[test]
    fn test_switch_flag_stops_run() {
        let mut sched = scheduler(&PULSE_EVERY_FOURTH, &config(150));
        let mut sink = RecordingSink::new(MemoryLog::default(), ());
        let switch = AtomicBool::new(true);

        let summary = block_on(sched.run(
            &mut sink,
            &mut ScriptedControl::default(),
            &mut (),
            &mut CountingYield::default(),
            &switch,
        ))
        .unwrap();

        assert_eq!(summary.reason, StopReason::Switch);
        assert_eq!(summary.iterations, 1);
        assert_eq!(sink.log().flushes, 1);
    }

    #[test]
    fn test_role_request_reported_on_restart() {
        let mut sched = scheduler(&PULSE_EVERY_FOURTH, &config(150));
        let mut sink = RecordingSink::new(MemoryLog::default(), ());
        let mut control = ScriptedControl::new(&[
            (1, ControlCommand::SetRole(Role::Follower)),
            (1, ControlCommand::Restart),
        ]);

        let summary = block_on(sched.run(
            &mut sink,
            &mut control,
            &mut (),
            &mut CountingYield::default(),
            &AtomicBool::new(false),
        ))
        .unwrap();

        assert_eq!(summary.reason, StopReason::Restart);
        assert_eq!(summary.requested_role, Some(Role::Follower));
        assert_eq!(sched.context().role(), Role::Leader);
    }

    #[test]
    fn test_log_failure_ends_run() {
        let mut sched = scheduler(&PULSE_EVERY_FOURTH, &config(150));
        let log = MemoryLog { fail_after: Some(1), ..MemoryLog::default() };
        let mut sink = RecordingSink::new(log, ());

        let result = block_on(sched.run(
            &mut sink,
            &mut ScriptedControl::default(),
            &mut (),
            &mut CountingYield::default(),
            &AtomicBool::new(false),
        ));

        assert_eq!(result, Err(AcquisitionError::DurableLog("card full")));
        assert_eq!(sched.aggregator().muon_count(), 2);
        assert_eq!(sink.log().events.len(), 1);
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(AcquisitionConfig::default().validate(), Ok(()));

        let equal = AcquisitionConfig { trigger_offset: 50.0, reset_offset: 50.0, ..config(150) };
        assert_eq!(equal.validate(), Ok(()));

        let inverted = AcquisitionConfig { trigger_offset: 50.0, reset_offset: 100.0, ..config(150) };
        assert_eq!(inverted.validate(), Err(ConfigError::ResetOffsetAboveTrigger));

        let nan = AcquisitionConfig { reset_offset: f32::NAN, ..config(150) };
        assert_eq!(nan.validate(), Err(ConfigError::ResetOffsetAboveTrigger));

        let wide = AcquisitionConfig { interval_capacity: 100, ..config(150) };
        assert_eq!(wide.validate(), Ok(()));

        let too_wide = AcquisitionConfig { interval_capacity: 121, ..config(150) };
        assert_eq!(
            too_wide.validate(),
            Err(ConfigError::CapacityOutOfRange { requested: 121, max: 120 })
        );

        let empty = AcquisitionConfig { rate_capacity: 0, ..config(150) };
        assert_eq!(empty.validate(), Err(ConfigError::CapacityOutOfRange { requested: 0, max: 120 }));
    }

    #[test]
    fn test_configured_interval_capacity_takes_effect() {
        let sched = scheduler(&[800], &AcquisitionConfig { interval_capacity: 100, ..config(150) });
        assert_eq!(sched.aggregator().intervals().capacity(), 100);
    }

    #[test]
    fn test_calibrated_run_uses_baseline() {
        let frontend = Frontend {
            signal: Pattern::new(&[800]),
            secondary: Constant(0),
            delay: NoDelay,
            clock: StepClock::default(),
            indicator: (),
        };
        let config = AcquisitionConfig { calibration_samples: 20, ..config(150) };
        let sched = CooperativeScheduler::calibrated(
            frontend,
            CoincidenceSynchronizer::<Unconnected, Unconnected>::leader(Unconnected),
            Role::Leader,
            &config,
        );
        let cal = sched.context().calibration();
        assert!((cal.baseline - 800.0).abs() < 1e-3);
        assert_eq!(cal.stddev, 0.0);
        assert_eq!(sched.context().thresholds(), Thresholds::new(1800, 850));
        assert_eq!(cal.run_start_time.as_str(), "2024-05-01T12:00:00.000000+00:00");
        assert_eq!(sched.into_frontend().signal.pos, 20);
    }
}
