//! Library crate for reconwalk: recon pipelines, noise filtering and
//! checkpointed scan orchestration.
pub mod artifacts;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod pipeline;
pub mod tool;
pub mod types;
pub mod workspace;

pub use error::{ReconError, Result};
pub use orchestrator::{Orchestrator, RunOutcome, RunState};
