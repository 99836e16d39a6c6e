//! Integration tests for the worker pool and inline connection.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use braid_pipeline::{PipelineError, Sink, Source, Worker, WorkerPool, inline};

struct Square;

#[async_trait]
impl Worker<u64, u64> for Square {
  async fn work(&self, item: u64) -> u64 {
    // Uneven delays so results interleave across workers
    tokio::time::sleep(Duration::from_millis(item % 3)).await;
    item * item
  }
}

fn square() -> Arc<dyn Worker<u64, u64>> {
  Arc::new(Square)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_no_loss_no_duplication() {
  let (connection, handle) = WorkerPool::replicate(square(), 4, 8);
  let mut jobs = connection.jobs;
  let mut results = connection.results;

  let producer = tokio::spawn(async move {
    for i in 0..100u64 {
      jobs.send(i).await.unwrap();
    }
    jobs.close().await;
  });

  let mut seen = Vec::new();
  while let Some(result) = results.next().await {
    seen.push(result);
  }
  producer.await.unwrap();

  assert_eq!(seen.len(), 100);
  let unique: HashSet<u64> = seen.iter().copied().collect();
  let expected: HashSet<u64> = (0..100u64).map(|i| i * i).collect();
  assert_eq!(unique, expected);

  let processed = handle.join().await.unwrap();
  assert_eq!(processed.len(), 4);
  assert_eq!(processed.iter().sum::<usize>(), 100);
}

#[tokio::test]
async fn test_pool_shutdown_with_no_jobs() {
  let (connection, handle) = WorkerPool::replicate(square(), 3, 4);
  let mut jobs = connection.jobs;
  let mut results = connection.results;

  jobs.close().await;
  assert_eq!(results.next().await, None);
  assert_eq!(handle.join().await.unwrap(), vec![0, 0, 0]);
}

#[tokio::test]
async fn test_pool_send_after_close() {
  let (connection, handle) = WorkerPool::replicate(square(), 2, 4);
  let mut jobs = connection.jobs;

  jobs.close().await;
  assert!(matches!(jobs.send(1).await, Err(PipelineError::Shutdown)));
  handle.join().await.unwrap();
}

#[tokio::test]
async fn test_pool_mixed_workers() {
  struct Double;

  #[async_trait]
  impl Worker<u64, u64> for Double {
    async fn work(&self, item: u64) -> u64 {
      item * 2
    }
  }

  let workers: Vec<Arc<dyn Worker<u64, u64>>> = vec![Arc::new(Double), Arc::new(Double)];
  let (connection, handle) = WorkerPool::spawn(workers, 4);
  let mut jobs = connection.jobs;
  let mut results = connection.results;

  jobs.send(1).await.unwrap();
  jobs.send(2).await.unwrap();
  jobs.close().await;

  let mut seen = Vec::new();
  while let Some(result) = results.next().await {
    seen.push(result);
  }
  seen.sort();
  assert_eq!(seen, vec![2, 4]);
  assert_eq!(handle.len(), 2);
  handle.join().await.unwrap();
}

#[tokio::test]
async fn test_inline_runs_on_pull() {
  let connection = inline(square());
  let mut jobs = connection.jobs;
  let mut results = connection.results;

  jobs.send(3).await.unwrap();
  jobs.send(4).await.unwrap();

  assert_eq!(results.next().await, Some(9));
  assert_eq!(results.next().await, Some(16));
  assert_eq!(results.next().await, None);

  jobs.close().await;
  assert!(matches!(jobs.send(5).await, Err(PipelineError::Shutdown)));
}
