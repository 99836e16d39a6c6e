//! Braid Store
//!
//! This crate provides the storage trait and implementations for provenance
//! job records. Records are kept in memory or persisted to SQLite.
//!
//! The [`Store`] trait is a small document-store interface:
//! - Inserting a record
//! - Querying by provenance key or by runtime key
//! - Replacing a record by runtime key
//! - Removing a record
//!
//! Implementations need not be thread-safe: callers hold exclusive access
//! (`&mut self`) for every mutation. `braid-provenance` wraps the store in a
//! single mutex.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::JobRecord;

use async_trait::async_trait;
use braid_workflow::{ProvenanceKey, RuntimeKey};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Applying the schema failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// A stored runtime key could not be parsed.
  #[error("invalid runtime key in store: {0}")]
  InvalidKey(String),
}

/// Storage trait for job records.
#[async_trait]
pub trait Store: Send + Sync {
  /// Insert a new record.
  async fn insert(&mut self, record: &JobRecord) -> Result<(), StoreError>;

  /// Find the record for a provenance key.
  async fn find_by_provenance(
    &self,
    provenance: &ProvenanceKey,
  ) -> Result<Option<JobRecord>, StoreError>;

  /// Find the record owned by a runtime key.
  async fn find_by_key(&self, key: &RuntimeKey) -> Result<Option<JobRecord>, StoreError>;

  /// Replace the record with the same runtime key. Returns `false` if none exists.
  async fn update(&mut self, record: &JobRecord) -> Result<bool, StoreError>;

  /// Remove the record owned by a runtime key. Returns `false` if none exists.
  async fn remove(&mut self, key: &RuntimeKey) -> Result<bool, StoreError>;

  /// Number of stored records.
  async fn count(&self) -> Result<usize, StoreError>;
}
