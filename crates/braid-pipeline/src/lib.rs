//! Braid Pipeline
//!
//! Stream connectors used to wire the scheduler to its workers without the
//! scheduler knowing how many workers exist or where they run.
//!
//! ```text
//!             ┌──────────── Connection ────────────┐
//! scheduler ──┤ jobs: Sink ──► worker(s) ──► results: Source ├──► scheduler
//!             └────────────────────────────────────┘
//! ```
//!
//! - [`Sink`] accepts items and may wait when the consumer is slower.
//! - [`Source`] yields items and returns `None` at end-of-stream.
//! - [`Branch`], [`Splice`], [`MapSink`] and [`Siphon`] tee items to observers.
//! - [`WorkerPool`] fans a job stream out to N workers and shuts them down with
//!   one [`Message::EndOfWork`] sentinel per worker.

mod branch;
mod error;
mod inline;
mod pool;
mod queue;
mod traits;

pub use branch::{Branch, MapSink, Siphon, Splice, patch};
pub use error::PipelineError;
pub use inline::inline;
pub use pool::{PoolHandle, PoolSink, WorkerPool};
pub use queue::{Message, QueueSink, QueueSource, queue};
pub use traits::{Connection, Sink, Source, Worker};
