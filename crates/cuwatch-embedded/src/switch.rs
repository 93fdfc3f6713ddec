//! User switch flag (lock-free, ISR safe)
//!
//! The board's GPIO interrupt handler calls [`UserSwitch::on_rising_edge`];
//! the acquisition loop polls the flag once per iteration and ends the run
//! when it is set. A `static` switch needs no locking:
//!
//! ```ignore
//! static SWITCH: UserSwitch = UserSwitch::new();
//!
//! #[interrupt]
//! fn IO_IRQ_BANK0() {
//!     SWITCH.on_rising_edge();
//! }
//!
//! scheduler.run(&mut sink, &mut control, &mut status, &mut yielder, SWITCH.flag()).await
//! ```

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Latched user switch state
pub struct UserSwitch {
    pressed: AtomicBool,
    /// Rising edges seen, including repeats while already latched
    edges: AtomicU32,
}

impl UserSwitch {
    /// Create an unpressed switch
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pressed: AtomicBool::new(false),
            edges: AtomicU32::new(0),
        }
    }

    /// Interrupt handler body for the switch's rising edge
    pub fn on_rising_edge(&self) {
        self.pressed.store(true, Ordering::Relaxed);
        // Single writer, and thumbv6m has no atomic read-modify-write
        let edges = self.edges.load(Ordering::Relaxed);
        self.edges.store(edges.wrapping_add(1), Ordering::Relaxed);
    }

    /// Check if the switch was pressed since the last `clear`
    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.pressed.load(Ordering::Relaxed)
    }

    /// Flag polled by the acquisition loop
    pub fn flag(&self) -> &AtomicBool {
        &self.pressed
    }

    /// Re-arm before the next run
    pub fn clear(&self) {
        self.pressed.store(false, Ordering::Relaxed);
    }

    /// Rising edges seen since boot
    pub fn edge_count(&self) -> u32 {
        self.edges.load(Ordering::Relaxed)
    }
}

impl Default for UserSwitch {
    fn default() -> Self {
        Self::new()
    }
}
