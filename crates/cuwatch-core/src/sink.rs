//! Event sink contract
//!
//! Every finished [`HitEvent`] is handed to an [`EventSink`], which has two
//! jobs with different failure rules:
//!
//! - **Durable log**: must accept every record. Append, flush or sync errors
//!   end the run.
//! - **Publisher**: best effort. A failed publish is counted and dropped; the
//!   core never retries.

use core::fmt;

use crate::protocol::{Telemetry, Topic};
use crate::types::HitEvent;

/// Append-only record store for hit events.
pub trait DurableLog {
    /// Storage error
    type Error: fmt::Debug;

    /// Append one event record
    ///
    /// # Errors
    ///
    /// Any storage failure; the scheduler treats it as fatal.
    fn append(&mut self, event: &HitEvent) -> Result<(), Self::Error>;

    /// Push buffered records to the storage layer
    ///
    /// # Errors
    ///
    /// Any storage failure.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Make flushed records durable
    ///
    /// # Errors
    ///
    /// Any storage failure.
    fn sync(&mut self) -> Result<(), Self::Error>;
}

/// Best-effort telemetry transport.
pub trait EventPublisher {
    /// Hand a payload to the transport; `false` if it was dropped
    fn publish(&mut self, topic: Topic, payload: Telemetry<'_>) -> bool;
}

impl EventPublisher for () {
    fn publish(&mut self, _topic: Topic, _payload: Telemetry<'_>) -> bool {
        true
    }
}

/// Destination for finished hit events.
pub trait EventSink {
    /// Durable log error
    type Error: fmt::Debug;

    /// Write the event to the durable log
    ///
    /// # Errors
    ///
    /// Durable log failure.
    fn record(&mut self, event: &HitEvent) -> Result<(), Self::Error>;

    /// Publish the event; `false` if the publisher dropped it
    fn publish_event(&mut self, event: &HitEvent) -> bool;

    /// Flush and sync the durable log
    ///
    /// # Errors
    ///
    /// Durable log failure.
    fn flush_and_sync(&mut self) -> Result<(), Self::Error>;
}

/// Sink pairing a durable log with a publisher.
#[derive(Debug)]
pub struct RecordingSink<L, P> {
    log: L,
    publisher: P,
    publish_failures: u32,
}

impl<L: DurableLog, P: EventPublisher> RecordingSink<L, P> {
    /// Combine a log and a publisher
    pub const fn new(log: L, publisher: P) -> Self {
        Self { log, publisher, publish_failures: 0 }
    }

    /// Publishes dropped so far
    pub const fn publish_failures(&self) -> u32 {
        self.publish_failures
    }

    /// Durable log
    pub const fn log(&self) -> &L {
        &self.log
    }

    /// Publisher
    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }

    /// Split back into log and publisher
    pub fn into_parts(self) -> (L, P) {
        (self.log, self.publisher)
    }
}

impl<L: DurableLog, P: EventPublisher> EventSink for RecordingSink<L, P> {
    type Error = L::Error;

    fn record(&mut self, event: &HitEvent) -> Result<(), Self::Error> {
        self.log.append(event)
    }

    fn publish_event(&mut self, event: &HitEvent) -> bool {
        let sent = self.publisher.publish(Topic::Event, Telemetry::Event(event));
        if !sent {
            self.publish_failures = self.publish_failures.saturating_add(1);
        }
        sent
    }

    fn flush_and_sync(&mut self) -> Result<(), Self::Error> {
        self.log.flush()?;
        self.log.sync()
    }
}
