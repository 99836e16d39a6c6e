//! Braid Scheduler
//!
//! Drives a workflow to its root result. The scheduler owns the graph state of
//! one run and talks to workers only through a
//! [`Connection`](braid_pipeline::Connection): it sends [`JobMessage`]s and
//! reads [`JobResult`]s, without knowing how many workers there are or where
//! they run.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                      Scheduler                        │
//! │  - per-node state: pending → ready → dispatched → done │
//! │  - provenance lookup: run / attach / retrieve          │
//! │  - error handler decides abort or substitute           │
//! └───────────────────────────────────────────────────────┘
//!             │ jobs                       ▲ results
//!             ▼                            │
//! ┌───────────────────────────────────────────────────────┐
//! │           Connection (inline, pool, process)           │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! The `run_*` functions assemble the usual connections.
//!
//! [`JobMessage`]: braid_worker::JobMessage
//! [`JobResult`]: braid_worker::JobResult

mod error;
mod events;
mod handler;
mod runner;
mod scheduler;

pub use error::SchedulerError;
pub use events::{
  ChannelNotifier, EventStatus, ExecutionNotifier, JobEvent, LogHandle, LogNotifier,
  NoopNotifier, NotifierSink, observe,
};
pub use handler::{AbortOnError, ErrorAction, ErrorHandler, SubstituteOnError};
pub use runner::{run_parallel, run_parallel_with_display, run_single, run_single_with_display};
pub use scheduler::{NodeState, Scheduler};
