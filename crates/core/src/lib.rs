//! # Iris Core
//!
//! Domain types, traits, and error definitions shared by every Iris crate.
//! Nothing here talks to the network or the filesystem; the crates that do
//! implement the traits defined in this one.
//!
//! ## Layout
//!
//! - [`domain`] holds the DTOs Artemis sends and expects back.
//! - [`provider`], [`model`] and [`tool`] describe the LLM tool-calling surface.
//! - [`memory`] and [`retrieval`] describe the long-term memory and content stores.
//! - [`stage`], [`scratch`] and [`token`] are the per-run bookkeeping types.

pub mod domain;
pub mod error;
pub mod memory;
pub mod message;
pub mod model;
pub mod provider;
pub mod retrieval;
pub mod scratch;
pub mod stage;
pub mod token;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use model::{BoundModel, CompletionArguments};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use scratch::{ScratchEntry, ScratchKind, Scratchpad};
pub use stage::{Stage, StageState};
pub use token::{PipelineKind, TokenUsage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
