//! Bounded queues with an explicit end-of-work sentinel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PipelineError;
use crate::traits::{Sink, Source};

/// What travels over a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
  Item(T),
  /// Sentinel: the consumer that receives it stops reading.
  EndOfWork,
}

/// Create a bounded queue.
///
/// Closing the sink enqueues [`Message::EndOfWork`]; the source drains every
/// item buffered before it and then reports end-of-stream. Dropping every
/// sink also ends the stream.
pub fn queue<T: Send>(capacity: usize) -> (QueueSink<T>, QueueSource<T>) {
  let (sender, receiver) = mpsc::channel(capacity.max(1));
  (
    QueueSink {
      sender,
      closed: Arc::new(AtomicBool::new(false)),
    },
    QueueSource::new(receiver),
  )
}

/// Producer end of a [`queue`]. Clones share the closed state.
#[derive(Debug)]
pub struct QueueSink<T> {
  sender: mpsc::Sender<Message<T>>,
  closed: Arc<AtomicBool>,
}

impl<T> Clone for QueueSink<T> {
  fn clone(&self) -> Self {
    Self {
      sender: self.sender.clone(),
      closed: self.closed.clone(),
    }
  }
}

impl<T> QueueSink<T> {
  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for QueueSink<T> {
  async fn send(&mut self, item: T) -> Result<(), PipelineError> {
    if self.is_closed() {
      return Err(PipelineError::Shutdown);
    }
    self
      .sender
      .send(Message::Item(item))
      .await
      .map_err(|_| PipelineError::Closed)
  }

  async fn close(&mut self) {
    if !self.closed.swap(true, Ordering::AcqRel) {
      // Receiver may already be gone
      let _ = self.sender.send(Message::EndOfWork).await;
    }
  }
}

/// Consumer end of a [`queue`].
#[derive(Debug)]
pub struct QueueSource<T> {
  receiver: mpsc::Receiver<Message<T>>,
  finished: bool,
}

impl<T> QueueSource<T> {
  pub(crate) fn new(receiver: mpsc::Receiver<Message<T>>) -> Self {
    Self {
      receiver,
      finished: false,
    }
  }
}

#[async_trait]
impl<T: Send + 'static> Source<T> for QueueSource<T> {
  async fn next(&mut self) -> Option<T> {
    if self.finished {
      return None;
    }
    match self.receiver.recv().await {
      Some(Message::Item(item)) => Some(item),
      Some(Message::EndOfWork) | None => {
        self.finished = true;
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_drains_before_end() {
    let (mut sink, mut source) = queue(8);
    sink.send(1).await.unwrap();
    sink.send(2).await.unwrap();
    sink.close().await;

    assert_eq!(source.next().await, Some(1));
    assert_eq!(source.next().await, Some(2));
    assert_eq!(source.next().await, None);
    assert_eq!(source.next().await, None);
  }

  #[tokio::test]
  async fn test_send_after_close() {
    let (mut sink, _source) = queue::<u32>(8);
    let mut other = sink.clone();
    sink.close().await;

    assert!(matches!(other.send(1).await, Err(PipelineError::Shutdown)));
  }

  #[tokio::test]
  async fn test_send_without_receiver() {
    let (mut sink, source) = queue::<u32>(8);
    drop(source);

    assert!(matches!(sink.send(1).await, Err(PipelineError::Closed)));
  }

  #[tokio::test]
  async fn test_dropping_sinks_ends_stream() {
    let (mut sink, mut source) = queue(8);
    sink.send("a").await.unwrap();
    drop(sink);

    assert_eq!(source.next().await, Some("a"));
    assert_eq!(source.next().await, None);
  }
}
