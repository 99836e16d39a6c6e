//! Braid Provenance
//!
//! Memoisation of jobs by their content. Every job is hashed into a
//! [`ProvenanceKey`](braid_workflow::ProvenanceKey) from its function,
//! its resolved arguments and its version hint. The [`JobDb`] keeps one
//! record per key and decides, for each new attempt, whether to:
//! - run it (no record yet, or a stale record left by a crashed owner)
//! - attach it to an attempt that is still running
//! - answer it from a stored result

mod db;
mod error;
mod keeper;
mod key;

pub use db::{Completion, JobDb, Outcome, Registration, RegistrationStatus};
pub use error::ProvenanceError;
pub use keeper::JobKeeper;
pub use key::prov_key;
