//! Braid Config
//!
//! This crate contains the serializable configuration types for braid.
//! These types describe workflows before they are validated and turned into
//! the runtime graph by `braid-workflow`, plus the backend settings that pick
//! how many workers run a workflow and where provenance records are kept.
//!
//! Configuration can be loaded from:
//! - JSON workflow files (via CLI with `braid run workflow.json`)
//! - A JSON backend file (via CLI with `--config=backend.json`)

mod backend;
mod error;
mod node;
mod workflow;

pub use backend::BackendConfig;
pub use error::ConfigError;
pub use node::{ArgumentDef, NodeDef};
pub use workflow::WorkflowDef;
