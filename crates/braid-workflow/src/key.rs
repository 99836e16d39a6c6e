use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one dispatch attempt of a job.
///
/// A fresh key is minted for every attempt, so two attempts of the same
/// computation never share a key. Formatted as 32 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeKey(Uuid);

impl RuntimeKey {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }

  pub fn as_uuid(&self) -> &Uuid {
    &self.0
  }
}

impl Default for RuntimeKey {
  fn default() -> Self {
    Self::new()
  }
}

impl From<Uuid> for RuntimeKey {
  fn from(uuid: Uuid) -> Self {
    Self(uuid)
  }
}

impl fmt::Display for RuntimeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.simple())
  }
}

impl FromStr for RuntimeKey {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Uuid::parse_str(s).map(Self)
  }
}

/// Content hash of a job: function, resolved arguments and version hint.
///
/// Jobs with equal provenance keys are taken to produce equal results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvenanceKey(String);

impl ProvenanceKey {
  pub fn new(digest: impl Into<String>) -> Self {
    Self(digest.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ProvenanceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_runtime_keys_are_unique() {
    let a = RuntimeKey::new();
    let b = RuntimeKey::new();
    assert_ne!(a, b);
  }

  #[test]
  fn test_runtime_key_display_round_trips() {
    let key = RuntimeKey::new();
    let text = key.to_string();
    assert_eq!(text.len(), 32);
    assert_eq!(text.parse::<RuntimeKey>().unwrap(), key);
  }
}
