//! Braid Worker
//!
//! Runs jobs. A worker takes a [`JobMessage`] (a runtime key and a fully
//! resolved job), calls the named function and answers with a [`JobResult`].
//! Workers never retry; what to do with a failure is up to the scheduler.
//!
//! Two flavours are provided:
//! - [`LocalWorker`] runs functions from a [`FunctionRegistry`] in-process
//! - [`ProcessWorker`] drives a child process speaking the line-delimited JSON
//!   protocol implemented by [`serve`]

mod error;
mod local;
mod registry;
mod remote;
mod result;

pub use error::WorkerError;
pub use local::LocalWorker;
pub use registry::{Arguments, Function, FunctionRegistry};
pub use remote::{ProcessHandle, ProcessWorker, serve};
pub use result::{JobMessage, JobResult, JobStatus};
