//! Combinators that tee a stream to an observer without changing the main path.
//!
//! Closing a combinator closes only its primary side. The observer side is
//! usually shared (one log queue fed from several places) and is closed by
//! whoever created it.

use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::debug;

use crate::error::PipelineError;
use crate::traits::{Sink, Source};

/// Forwards every item to `primary` and a clone of it to `tee`.
pub struct Branch<A, B> {
  primary: A,
  tee: B,
}

impl<A, B> Branch<A, B> {
  pub fn new(primary: A, tee: B) -> Self {
    Self { primary, tee }
  }
}

#[async_trait]
impl<T, A, B> Sink<T> for Branch<A, B>
where
  T: Clone + Send + 'static,
  A: Sink<T>,
  B: Sink<T>,
{
  async fn send(&mut self, item: T) -> Result<(), PipelineError> {
    self.primary.send(item.clone()).await?;
    self.tee.send(item).await
  }

  async fn close(&mut self) {
    self.primary.close().await;
  }
}

/// Forwards every item to `primary` and a companion event derived from it to
/// `companion`. The companion is sent after the item.
pub struct Splice<A, B, F, U> {
  primary: A,
  companion: B,
  event: F,
  _event: PhantomData<fn() -> U>,
}

impl<A, B, F, U> Splice<A, B, F, U> {
  pub fn new(primary: A, companion: B, event: F) -> Self {
    Self {
      primary,
      companion,
      event,
      _event: PhantomData,
    }
  }
}

#[async_trait]
impl<T, U, A, B, F> Sink<T> for Splice<A, B, F, U>
where
  T: Send + 'static,
  U: Send + 'static,
  A: Sink<T>,
  B: Sink<U>,
  F: Fn(&T) -> U + Send + Sync,
{
  async fn send(&mut self, item: T) -> Result<(), PipelineError> {
    let event = (self.event)(&item);
    self.primary.send(item).await?;
    self.companion.send(event).await
  }

  async fn close(&mut self) {
    self.primary.close().await;
  }
}

/// Applies a function to every item before forwarding it.
pub struct MapSink<S, F, T> {
  inner: S,
  map: F,
  _input: PhantomData<fn(T)>,
}

impl<S, F, T> MapSink<S, F, T> {
  pub fn new(inner: S, map: F) -> Self {
    Self {
      inner,
      map,
      _input: PhantomData,
    }
  }
}

#[async_trait]
impl<T, U, S, F> Sink<T> for MapSink<S, F, T>
where
  T: Send + 'static,
  U: Send + 'static,
  S: Sink<U>,
  F: Fn(T) -> U + Send + Sync,
{
  async fn send(&mut self, item: T) -> Result<(), PipelineError> {
    let mapped = (self.map)(item);
    self.inner.send(mapped).await
  }

  async fn close(&mut self) {
    self.inner.close().await;
  }
}

/// A source that copies every item it yields into a sink.
///
/// Errors from the observing sink are logged and ignored so an observer can
/// never stall the main data path.
pub struct Siphon<S, K> {
  source: S,
  sink: K,
}

impl<S, K> Siphon<S, K> {
  pub fn new(source: S, sink: K) -> Self {
    Self { source, sink }
  }
}

#[async_trait]
impl<T, S, K> Source<T> for Siphon<S, K>
where
  T: Clone + Send + 'static,
  S: Source<T>,
  K: Sink<T>,
{
  async fn next(&mut self) -> Option<T> {
    let item = self.source.next().await?;
    if let Err(e) = self.sink.send(item.clone()).await {
      debug!(error = %e, "siphon observer rejected item");
    }
    Some(item)
  }
}

/// Drain `source` into `sink` until end-of-stream, then close the sink.
///
/// Returns the number of items moved.
pub async fn patch<T, S, K>(mut source: S, mut sink: K) -> Result<usize, PipelineError>
where
  T: Send + 'static,
  S: Source<T>,
  K: Sink<T>,
{
  let mut moved = 0;
  while let Some(item) = source.next().await {
    sink.send(item).await?;
    moved += 1;
  }
  sink.close().await;
  Ok(moved)
}
