use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use braid_workflow::{ProvenanceKey, RuntimeKey};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};

use crate::{JobRecord, Store, StoreError};

/// SQLite-based store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

/// A job record as stored in the `jobs` table.
#[derive(FromRow)]
struct JobRow {
  runtime_key: String,
  provenance: String,
  attached: Json<Vec<RuntimeKey>>,
  time: Json<BTreeMap<String, DateTime<Utc>>>,
  function: String,
  arguments: Json<serde_json::Value>,
  version: Option<String>,
  result: Option<Json<serde_json::Value>>,
}

impl TryFrom<JobRow> for JobRecord {
  type Error = StoreError;

  fn try_from(row: JobRow) -> Result<Self, Self::Error> {
    let runtime_key = row
      .runtime_key
      .parse()
      .map_err(|_| StoreError::InvalidKey(row.runtime_key.clone()))?;

    Ok(Self {
      runtime_key,
      provenance: ProvenanceKey::new(row.provenance),
      attached: row.attached.0,
      time: row.time.0,
      function: row.function,
      arguments: row.arguments.0,
      version: row.version,
      result: row.result.map(|r| r.0),
    })
  }
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Open (or create) a database file and apply the schema.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
    let options = SqliteConnectOptions::new()
      .filename(path)
      .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .connect_with(options)
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// A private in-memory database. It lives as long as the store.
  pub async fn in_memory() -> Result<Self, StoreError> {
    // A single connection that never idles out; each new connection to
    // `:memory:` would see an empty database.
    let pool = SqlitePoolOptions::new()
      .max_connections(1)
      .min_connections(1)
      .idle_timeout(None)
      .max_lifetime(None)
      .connect("sqlite::memory:")
      .await?;

    let store = Self::new(pool);
    store.migrate().await?;
    Ok(store)
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(&self.pool).await?;
    Ok(())
  }

  async fn fetch(&self, column: &str, value: &str) -> Result<Option<JobRecord>, StoreError> {
    let query = format!(
      r#"
            SELECT runtime_key, provenance, attached, time, function, arguments, version, result
            FROM jobs
            WHERE {column} = ?
            LIMIT 1
            "#
    );

    let row: Option<JobRow> = sqlx::query_as(&query)
      .bind(value)
      .fetch_optional(&self.pool)
      .await?;

    row.map(JobRecord::try_from).transpose()
  }
}

#[async_trait]
impl Store for SqliteStore {
  async fn insert(&mut self, record: &JobRecord) -> Result<(), StoreError> {
    sqlx::query(
      r#"
            INSERT INTO jobs (runtime_key, provenance, attached, time, function, arguments, version, result)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
    )
    .bind(record.runtime_key.to_string())
    .bind(record.provenance.as_str())
    .bind(Json(&record.attached))
    .bind(Json(&record.time))
    .bind(&record.function)
    .bind(Json(&record.arguments))
    .bind(&record.version)
    .bind(record.result.as_ref().map(Json))
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn find_by_provenance(
    &self,
    provenance: &ProvenanceKey,
  ) -> Result<Option<JobRecord>, StoreError> {
    self.fetch("provenance", provenance.as_str()).await
  }

  async fn find_by_key(&self, key: &RuntimeKey) -> Result<Option<JobRecord>, StoreError> {
    self.fetch("runtime_key", &key.to_string()).await
  }

  async fn update(&mut self, record: &JobRecord) -> Result<bool, StoreError> {
    let done = sqlx::query(
      r#"
            UPDATE jobs
            SET provenance = ?, attached = ?, time = ?, function = ?, arguments = ?, version = ?, result = ?
            WHERE runtime_key = ?
            "#,
    )
    .bind(record.provenance.as_str())
    .bind(Json(&record.attached))
    .bind(Json(&record.time))
    .bind(&record.function)
    .bind(Json(&record.arguments))
    .bind(&record.version)
    .bind(record.result.as_ref().map(Json))
    .bind(record.runtime_key.to_string())
    .execute(&self.pool)
    .await?;

    Ok(done.rows_affected() > 0)
  }

  async fn remove(&mut self, key: &RuntimeKey) -> Result<bool, StoreError> {
    let done = sqlx::query("DELETE FROM jobs WHERE runtime_key = ?")
      .bind(key.to_string())
      .execute(&self.pool)
      .await?;

    Ok(done.rows_affected() > 0)
  }

  async fn count(&self) -> Result<usize, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
      .fetch_one(&self.pool)
      .await?;

    Ok(count as usize)
  }
}
