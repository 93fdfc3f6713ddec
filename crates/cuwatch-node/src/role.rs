//! Persisted node role.
//!
//! A node is a follower when the marker file `is_secondary` exists in its
//! data directory and a leader otherwise. The role is read once per run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use cuwatch_core::Role;

/// Marker file name; present means follower
pub const SECONDARY_MARKER: &str = "is_secondary";

/// Role marker could not be read or written.
#[derive(Debug, Error)]
#[error("Cannot update role marker {}: {source}", .path.display())]
pub struct RoleError {
    path: PathBuf,
    source: io::Error,
}

/// Role marker in a data directory.
#[derive(Clone, Debug)]
pub struct RoleStore {
    marker: PathBuf,
}

impl RoleStore {
    /// Store for `data_dir`
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self { marker: data_dir.join(SECONDARY_MARKER) }
    }

    /// Current role
    #[must_use]
    pub fn load(&self) -> Role {
        if self.marker.exists() {
            Role::Follower
        } else {
            Role::Leader
        }
    }

    /// Persist `role` for the next run.
    pub fn persist(&self, role: Role) -> Result<(), RoleError> {
        let result = match role {
            Role::Follower => {
                if let Some(dir) = self.marker.parent() {
                    fs::create_dir_all(dir).map_err(|source| self.error(source))?;
                }
                fs::write(&self.marker, b"")
            }
            Role::Leader => match fs::remove_file(&self.marker) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        result.map_err(|source| self.error(source))?;
        info!("Role set to {} (takes effect on the next run)", role);
        Ok(())
    }

    fn error(&self, source: io::Error) -> RoleError {
        RoleError { path: self.marker.clone(), source }
    }
}
