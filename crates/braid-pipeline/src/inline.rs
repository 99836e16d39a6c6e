//! Single-context connection without any spawned task.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::PipelineError;
use crate::traits::{Connection, Sink, Source, Worker};

struct Pending<I> {
  items: VecDeque<I>,
  closed: bool,
}

struct InlineSink<I> {
  pending: Arc<Mutex<Pending<I>>>,
}

struct InlineSource<I, O> {
  pending: Arc<Mutex<Pending<I>>>,
  worker: Arc<dyn Worker<I, O>>,
}

#[async_trait]
impl<I: Send + 'static> Sink<I> for InlineSink<I> {
  async fn send(&mut self, item: I) -> Result<(), PipelineError> {
    let mut pending = self.pending.lock().await;
    if pending.closed {
      return Err(PipelineError::Shutdown);
    }
    pending.items.push_back(item);
    Ok(())
  }

  async fn close(&mut self) {
    self.pending.lock().await.closed = true;
  }
}

#[async_trait]
impl<I: Send + 'static, O: Send + 'static> Source<O> for InlineSource<I, O> {
  async fn next(&mut self) -> Option<O> {
    let item = self.pending.lock().await.items.pop_front()?;
    Some(self.worker.work(item).await)
  }
}

/// Connect a single worker that runs a job each time a result is pulled.
///
/// Jobs are buffered without bound and executed in FIFO order on the caller's
/// task. The result source ends as soon as no job is buffered.
pub fn inline<I, O>(worker: Arc<dyn Worker<I, O>>) -> Connection<I, O>
where
  I: Send + 'static,
  O: Send + 'static,
{
  let pending = Arc::new(Mutex::new(Pending {
    items: VecDeque::new(),
    closed: false,
  }));
  Connection::new(
    InlineSink {
      pending: pending.clone(),
    },
    InlineSource { pending, worker },
  )
}
