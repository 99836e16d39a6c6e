use std::collections::BTreeMap;

use braid_workflow::{ProvenanceKey, RuntimeKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One provenance record, keyed by the provenance of the job.
///
/// `attached` lists the attempts waiting on this one and never contains
/// `runtime_key` itself. `result` is written once; a record without a result
/// belongs to an attempt that is still running or has crashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
  pub runtime_key: RuntimeKey,
  pub provenance: ProvenanceKey,
  pub attached: Vec<RuntimeKey>,
  /// Named instants, e.g. `schedule` and `done`.
  pub time: BTreeMap<String, DateTime<Utc>>,
  pub function: String,
  pub arguments: serde_json::Value,
  pub version: Option<String>,
  pub result: Option<serde_json::Value>,
}

impl JobRecord {
  /// A fresh record owned by `runtime_key`, stamped with the schedule time.
  pub fn new(
    runtime_key: RuntimeKey,
    provenance: ProvenanceKey,
    function: impl Into<String>,
    arguments: serde_json::Value,
    version: Option<String>,
  ) -> Self {
    Self {
      runtime_key,
      provenance,
      attached: Vec::new(),
      time: BTreeMap::from([("schedule".to_string(), Utc::now())]),
      function: function.into(),
      arguments,
      version,
      result: None,
    }
  }

  pub fn is_done(&self) -> bool {
    self.result.is_some()
  }
}
