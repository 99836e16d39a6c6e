//! Braid Workflow
//!
//! This crate provides the validated workflow representation for braid.
//! A workflow is a directed acyclic graph of deferred function calls built
//! from a `braid-config` definition, with a single root whose result is the
//! result of the run.
//!
//! Key differences from `braid-config`:
//! - References are checked (every `ref` names an existing node, no cycles)
//! - Edge lists (producer -> consumer argument slot) are derived for traversal
//! - Nodes can be turned into [`Job`]s once all their arguments are values

mod error;
mod graph;
mod job;
mod key;
mod node;
mod workflow;

pub use error::WorkflowError;
pub use graph::{Graph, Link};
pub use job::Job;
pub use key::{ProvenanceKey, RuntimeKey};
pub use node::{Argument, Hints, Node};
pub use workflow::Workflow;
