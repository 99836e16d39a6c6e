use async_trait::async_trait;

use crate::error::PipelineError;

/// Accepts a sequence of items one at a time.
#[async_trait]
pub trait Sink<T: Send + 'static>: Send {
  /// Send one item, waiting while the buffer is full.
  async fn send(&mut self, item: T) -> Result<(), PipelineError>;

  /// Mark that no more input will arrive. Closing twice is a no-op.
  async fn close(&mut self);
}

/// Produces a sequence of items.
#[async_trait]
pub trait Source<T: Send + 'static>: Send {
  /// Wait for the next item. `None` means end-of-stream.
  async fn next(&mut self) -> Option<T>;
}

/// Turns one input into one output.
#[async_trait]
pub trait Worker<I: Send + 'static, O: Send + 'static>: Send + Sync {
  async fn work(&self, item: I) -> O;
}

#[async_trait]
impl<T: Send + 'static, S: Sink<T> + ?Sized> Sink<T> for Box<S> {
  async fn send(&mut self, item: T) -> Result<(), PipelineError> {
    (**self).send(item).await
  }

  async fn close(&mut self) {
    (**self).close().await
  }
}

#[async_trait]
impl<T: Send + 'static, S: Source<T> + ?Sized> Source<T> for Box<S> {
  async fn next(&mut self) -> Option<T> {
    (**self).next().await
  }
}

/// The two ends the scheduler talks to: where jobs go and where results come from.
pub struct Connection<I, O> {
  pub jobs: Box<dyn Sink<I>>,
  pub results: Box<dyn Source<O>>,
}

impl<I: Send + 'static, O: Send + 'static> Connection<I, O> {
  pub fn new(jobs: impl Sink<I> + 'static, results: impl Source<O> + 'static) -> Self {
    Self {
      jobs: Box::new(jobs),
      results: Box::new(results),
    }
  }
}
