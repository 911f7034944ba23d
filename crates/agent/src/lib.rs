//! The agent side of Iris.
//!
//! An [`AgentPipeline`] describes what a pipeline does (tools, system
//! prompt, hooks); [`run_pipeline`] drives it through the fixed lifecycle
//! and owns failure handling. The tool-calling loop itself lives in
//! [`AgentExecutor`].

pub mod context;
pub mod executor;
pub mod pipeline;
pub mod prompt;
pub mod state;
pub mod variant;

#[cfg(test)]
mod test_helpers;

pub use context::PipelineContext;
pub use executor::{AgentExecutor, AgentStep, IntermediateStep};
pub use pipeline::{AgentPipeline, recent_history, run_pipeline};
pub use prompt::{ChatPrompt, PromptError};
pub use state::ExecutionState;
pub use variant::{AgentVariant, VariantInfo, available_variants};
