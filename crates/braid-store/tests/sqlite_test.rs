use braid_store::{JobRecord, SqliteStore, Store};
use braid_workflow::{ProvenanceKey, RuntimeKey};
use serde_json::json;

fn record(prov: &str) -> JobRecord {
  JobRecord::new(
    RuntimeKey::new(),
    ProvenanceKey::new(prov),
    "add",
    json!({"x": 1, "y": 1}),
    Some("1".to_string()),
  )
}

#[tokio::test]
async fn test_insert_and_find() {
  let mut store = SqliteStore::in_memory().await.unwrap();
  let rec = record("p1");
  store.insert(&rec).await.unwrap();

  let found = store
    .find_by_provenance(&rec.provenance)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.runtime_key, rec.runtime_key);
  assert_eq!(found.arguments, json!({"x": 1, "y": 1}));
  assert_eq!(found.version.as_deref(), Some("1"));
  assert!(found.result.is_none());
  assert!(found.time.contains_key("schedule"));

  assert!(
    store
      .find_by_provenance(&ProvenanceKey::new("other"))
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn test_null_result_differs_from_missing_result() {
  let mut store = SqliteStore::in_memory().await.unwrap();
  let mut rec = record("p1");
  store.insert(&rec).await.unwrap();

  rec.result = Some(serde_json::Value::Null);
  assert!(store.update(&rec).await.unwrap());

  let found = store.find_by_key(&rec.runtime_key).await.unwrap().unwrap();
  assert_eq!(found.result, Some(serde_json::Value::Null));
  assert!(found.is_done());
}

#[tokio::test]
async fn test_update_attached_and_remove() {
  let mut store = SqliteStore::in_memory().await.unwrap();
  let mut rec = record("p1");
  store.insert(&rec).await.unwrap();

  let waiter = RuntimeKey::new();
  rec.attached.push(waiter);
  assert!(store.update(&rec).await.unwrap());
  let found = store.find_by_key(&rec.runtime_key).await.unwrap().unwrap();
  assert_eq!(found.attached, vec![waiter]);

  assert!(store.remove(&rec.runtime_key).await.unwrap());
  assert_eq!(store.count().await.unwrap(), 0);
  assert!(!store.update(&rec).await.unwrap());
}

#[tokio::test]
async fn test_records_survive_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("jobs.db");

  let mut rec = record("p1");
  rec.result = Some(json!(2));
  {
    let mut store = SqliteStore::open(&path).await.unwrap();
    store.insert(&rec).await.unwrap();
  }

  let store = SqliteStore::open(&path).await.unwrap();
  assert_eq!(store.count().await.unwrap(), 1);
  let found = store
    .find_by_provenance(&rec.provenance)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.result, Some(json!(2)));
}
