//! CUWatch Node - host runtime for a muon detector node
//!
//! Wires the `no_std` acquisition core to host collaborators: a simulated
//! front end, a CSV durable log, a JSON-lines telemetry publisher, a control
//! queue, a status board and the persisted node role.
//!
//! # Modules
//!
//! - [`config`]: Node configuration file and defaults
//! - [`clock`]: Wrapping millisecond clock and ISO 8601 wall clock
//! - [`sim`]: Simulated detector signal, temperature channel and coincidence wire
//! - [`durable`]: Per-run CSV log
//! - [`publish`]: Non-blocking telemetry publisher and transport writer
//! - [`control`]: Control message decoding and the command queue
//! - [`status`]: Status board and periodic status publishing
//! - [`role`]: Persisted leader/follower role
//! - [`runtime`]: Tokio yield, blocking delay, heartbeat and Ctrl-C hooks
//! - [`node`]: Run/restart supervisor

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod control;
pub mod durable;
pub mod node;
pub mod publish;
pub mod role;
pub mod runtime;
pub mod sim;
pub mod status;

pub use config::NodeConfig;
pub use node::{Node, NodeReport};
