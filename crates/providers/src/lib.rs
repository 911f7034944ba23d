//! LLM provider implementations for Iris.
//!
//! Every configured endpoint becomes an [`OpenAiCompatProvider`]; the
//! [`ModelRouter`] picks the one that serves a requested model.

pub mod openai_compat;
pub mod router;

pub use openai_compat::{Endpoint, OpenAiCompatProvider};
pub use router::{ModelRouter, build_from_config};
