//! Backend configuration.
//!
//! Selects how a workflow is driven: how many workers pull jobs, how deep the
//! job queue is, and whether provenance records are kept on disk.
//!
//! ```json
//! { "workers": 4, "db_path": "/home/me/.braid/jobs.db", "display": true }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
  /// Number of parallel workers.
  pub workers: usize,
  /// Capacity of the job and result queues.
  pub queue_capacity: usize,
  /// SQLite file for provenance records. `None` disables memoization.
  pub db_path: Option<PathBuf>,
  /// Print job start/finish events while running.
  pub display: bool,
}

impl Default for BackendConfig {
  fn default() -> Self {
    Self {
      workers: 1,
      queue_capacity: 64,
      db_path: None,
      display: false,
    }
  }
}

impl BackendConfig {
  /// Load a backend configuration from a JSON file.
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }
}
