//! Retrieve-then-generate pipeline: state, merge policy and the orchestrator.

pub mod orchestrator;
pub mod state;

pub use orchestrator::{Node, Pipeline, Topology};
pub use state::{MergeStrategy, PipelineState, Retrieval, StateUpdate};
