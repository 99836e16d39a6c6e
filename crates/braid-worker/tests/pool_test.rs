use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use braid_pipeline::{Connection, Sink, Source, Worker, WorkerPool};
use braid_worker::{FunctionRegistry, JobMessage, JobResult, JobStatus, LocalWorker};
use braid_workflow::{Argument, Hints, Job, RuntimeKey};
use serde_json::json;

fn mul(x: i64, y: i64) -> Job {
  Job {
    node_id: format!("mul-{}-{}", x, y),
    function: "mul".to_string(),
    arguments: BTreeMap::from([
      ("x".to_string(), Argument::Value(json!(x))),
      ("y".to_string(), Argument::Value(json!(y))),
    ]),
    hints: Hints::default(),
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_local_workers_in_pool() {
  let worker: Arc<dyn Worker<JobMessage, JobResult>> =
    Arc::new(LocalWorker::new(Arc::new(FunctionRegistry::builtin())));
  let (connection, handle) = WorkerPool::replicate(worker, 4, 8);
  let Connection { mut jobs, mut results } = connection;

  let mut expected = HashMap::new();
  let mut messages = Vec::new();
  for i in 0..50 {
    let key = RuntimeKey::new();
    expected.insert(key, json!(i * 3));
    messages.push(JobMessage::new(key, mul(i, 3)));
  }

  // Jobs are sent while results are being read.
  let producer = tokio::spawn(async move {
    for message in messages {
      jobs.send(message).await.unwrap();
    }
    jobs.close().await;
  });

  while let Some(result) = results.next().await {
    assert_eq!(result.status, JobStatus::Ok);
    let want = expected.remove(&result.key).unwrap();
    assert_eq!(result.result, want);
  }
  assert!(expected.is_empty());
  producer.await.unwrap();

  let served = handle.join().await.unwrap();
  assert_eq!(served.iter().sum::<usize>(), 50);
}
