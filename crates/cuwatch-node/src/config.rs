//! Node configuration.
//!
//! Loaded from an optional JSON file; anything the file leaves out takes its
//! default. CLI flags are applied on top by `main`.
//!
//! ```json
//! {
//!   "device_id": 3,
//!   "data_dir": "/var/lib/cuwatch",
//!   "acquisition": { "wait_budget": 150, "interval_capacity": 10 },
//!   "simulation": { "pulse_rate_hz": 1.5 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cuwatch_core::{AcquisitionConfig, ConfigError};

use crate::sim::SimulationConfig;

/// File in the data directory holding the device number
pub const DEVICE_ID_FILE: &str = "id.txt";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// File could not be read
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid configuration JSON
    #[error("Invalid configuration in {}: {source}", .path.display())]
    Parse {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },

    /// Acquisition settings a run cannot use
    #[error("Invalid acquisition settings in {}: {source}", .path.display())]
    Invalid {
        /// Offending path
        path: PathBuf,
        /// Rejected setting
        source: ConfigError,
    },

    /// Device id file holds something other than a number
    #[error("Invalid device id in {}: {content:?}", .path.display())]
    DeviceId {
        /// Offending path
        path: PathBuf,
        /// File content
        content: String,
    },
}

/// Everything the host node needs to run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Device number used in topic names; read from `id.txt` when unset
    pub device_id: Option<u16>,
    /// Directory holding data files, the role marker and `id.txt`
    pub data_dir: PathBuf,
    /// Interval between status publishes
    pub status_interval_secs: u64,
    /// Outgoing telemetry queue depth before publishes are dropped
    pub publish_queue: usize,
    /// Pending control commands
    pub control_queue: usize,
    /// Simulated front end parameters
    pub simulation: SimulationConfig,
    /// Acquisition loop tunables
    pub acquisition: AcquisitionConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            device_id: None,
            data_dir: PathBuf::from("data"),
            status_interval_secs: 30,
            publish_queue: 256,
            control_queue: 16,
            simulation: SimulationConfig::default(),
            acquisition: AcquisitionConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load from `path`, or use defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigFileError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigFileError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.acquisition.validate().map_err(|source| ConfigFileError::Invalid {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    /// Status publish interval
    #[must_use]
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    /// Configured device id, else the one stored in the data directory, else 0.
    pub fn resolve_device_id(&self) -> Result<u16, ConfigFileError> {
        if let Some(id) = self.device_id {
            return Ok(id);
        }
        let path = self.data_dir.join(DEVICE_ID_FILE);
        match fs::read_to_string(&path) {
            Ok(content) => content.trim().parse().map_err(|_| ConfigFileError::DeviceId {
                path,
                content,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(source) => Err(ConfigFileError::Io { path, source }),
        }
    }
}
