//! Host implementations of the loop's runtime hooks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use tracing::{info, warn};

use cuwatch_core::{ActivityIndicator, Cooperative, YieldPoint};

/// Pause after a reset-wait timeout
pub const TIMEOUT_PAUSE: Duration = Duration::from_millis(5);

/// Yields to the tokio scheduler.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioYield;

impl Cooperative for TokioYield {
    async fn yield_now(&mut self, point: YieldPoint) {
        match point {
            YieldPoint::Periodic => tokio::task::yield_now().await,
            YieldPoint::ResetTimeout => tokio::time::sleep(TIMEOUT_PAUSE).await,
        }
    }
}

/// Blocking delay.
///
/// Microsecond pauses spin; the OS sleep granularity is far too coarse for
/// the reset-wait loop.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpinDelay;

impl DelayNs for SpinDelay {
    fn delay_ns(&mut self, ns: u32) {
        let wait = Duration::from_nanos(u64::from(ns));
        if wait >= Duration::from_millis(1) {
            std::thread::sleep(wait);
            return;
        }
        let start = Instant::now();
        while start.elapsed() < wait {
            std::hint::spin_loop();
        }
    }
}

/// Activity indicator that logs the heartbeat.
#[derive(Debug, Default)]
pub struct HeartbeatLog {
    beat: bool,
}

impl ActivityIndicator for HeartbeatLog {
    fn set(&mut self, _on: bool) {}

    fn toggle_heartbeat(&mut self) {
        self.beat = !self.beat;
        info!("heartbeat {}", if self.beat { "on" } else { "off" });
    }
}

/// Raise `switch` on Ctrl-C, the host's user switch.
pub async fn watch_interrupt(switch: Arc<AtomicBool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Interrupt received, stopping acquisition");
            switch.store(true, Ordering::Relaxed);
        }
        Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spin_delay_waits_at_least_requested() {
        let mut delay = SpinDelay;
        let start = Instant::now();
        delay.delay_us(200);
        assert!(start.elapsed() >= Duration::from_micros(200));

        let start = Instant::now();
        delay.delay_ms(2);
        assert!(start.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn test_heartbeat_toggles() {
        let mut led = HeartbeatLog::default();
        led.toggle_heartbeat();
        assert!(led.beat);
        led.toggle_heartbeat();
        assert!(!led.beat);
    }

    #[tokio::test]
    async fn test_timeout_yield_lets_other_tasks_run() {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&flag);
        let task = tokio::spawn(async move { seen.store(true, Ordering::Relaxed) });

        let start = Instant::now();
        TokioYield.yield_now(YieldPoint::ResetTimeout).await;
        assert!(start.elapsed() >= TIMEOUT_PAUSE);
        assert!(flag.load(Ordering::Relaxed));
        task.await.unwrap();

        TokioYield.yield_now(YieldPoint::Periodic).await;
    }
}
