//! Fan-out worker pool.
//!
//! Every worker runs in its own tokio task and competes for jobs on one shared
//! queue. Closing the pool's job sink enqueues one [`Message::EndOfWork`] per
//! worker behind the pending jobs, so each worker drains its share and sees
//! exactly one sentinel. Each worker holds a clone of the result sender, so the
//! result source ends only after the last worker has exited.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::queue::{Message, QueueSource};
use crate::traits::{Connection, Sink, Worker};

/// Job end of a [`WorkerPool`].
pub struct PoolSink<I> {
  sender: mpsc::Sender<Message<I>>,
  workers: usize,
  closed: Arc<AtomicBool>,
}

#[async_trait]
impl<I: Send + 'static> Sink<I> for PoolSink<I> {
  async fn send(&mut self, item: I) -> Result<(), PipelineError> {
    if self.closed.load(Ordering::Acquire) {
      return Err(PipelineError::Shutdown);
    }
    self
      .sender
      .send(Message::Item(item))
      .await
      .map_err(|_| PipelineError::Closed)
  }

  async fn close(&mut self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    for _ in 0..self.workers {
      if self.sender.send(Message::EndOfWork).await.is_err() {
        // All workers already gone
        break;
      }
    }
  }
}

/// Handle used to wait for the pool's workers after shutdown.
pub struct PoolHandle {
  handles: Vec<JoinHandle<usize>>,
}

impl PoolHandle {
  /// Number of worker tasks.
  pub fn len(&self) -> usize {
    self.handles.len()
  }

  pub fn is_empty(&self) -> bool {
    self.handles.is_empty()
  }

  /// Wait for every worker to exit. Returns the number of jobs each worker ran.
  pub async fn join(self) -> Result<Vec<usize>, PipelineError> {
    futures::future::join_all(self.handles)
      .await
      .into_iter()
      .map(|result| {
        result.map_err(|e| PipelineError::WorkerFailed {
          message: e.to_string(),
        })
      })
      .collect()
  }
}

/// A pool of workers sharing one job queue and one result queue.
pub struct WorkerPool;

impl WorkerPool {
  /// Start one task per worker.
  ///
  /// Must be called from within a tokio runtime.
  pub fn spawn<I, O>(
    workers: Vec<Arc<dyn Worker<I, O>>>,
    capacity: usize,
  ) -> (Connection<I, O>, PoolHandle)
  where
    I: Send + 'static,
    O: Send + 'static,
  {
    let capacity = capacity.max(1);
    let (job_sender, job_receiver) = mpsc::channel::<Message<I>>(capacity);
    let (result_sender, result_receiver) = mpsc::channel::<Message<O>>(capacity);
    let jobs = Arc::new(Mutex::new(job_receiver));

    let handles = workers
      .into_iter()
      .enumerate()
      .map(|(index, worker)| {
        let jobs = jobs.clone();
        let results = result_sender.clone();
        tokio::spawn(async move { worker_loop(index, worker, jobs, results).await })
      })
      .collect::<Vec<_>>();

    let sink = PoolSink {
      sender: job_sender,
      workers: handles.len(),
      closed: Arc::new(AtomicBool::new(false)),
    };

    // Workers hold the only result senders from here on
    drop(result_sender);

    (
      Connection::new(sink, QueueSource::new(result_receiver)),
      PoolHandle { handles },
    )
  }

  /// Start `count` tasks all running the same worker.
  pub fn replicate<I, O>(
    worker: Arc<dyn Worker<I, O>>,
    count: usize,
    capacity: usize,
  ) -> (Connection<I, O>, PoolHandle)
  where
    I: Send + 'static,
    O: Send + 'static,
  {
    let workers = (0..count.max(1)).map(|_| worker.clone()).collect();
    Self::spawn(workers, capacity)
  }
}

async fn worker_loop<I, O>(
  index: usize,
  worker: Arc<dyn Worker<I, O>>,
  jobs: Arc<Mutex<mpsc::Receiver<Message<I>>>>,
  results: mpsc::Sender<Message<O>>,
) -> usize
where
  I: Send + 'static,
  O: Send + 'static,
{
  let mut processed = 0;
  loop {
    let message = { jobs.lock().await.recv().await };
    match message {
      Some(Message::Item(item)) => {
        let output = worker.work(item).await;
        processed += 1;
        if results.send(Message::Item(output)).await.is_err() {
          warn!(worker = index, "result consumer dropped, stopping worker");
          break;
        }
      }
      Some(Message::EndOfWork) | None => break,
    }
  }
  debug!(worker = index, processed, "worker finished");
  processed
}
