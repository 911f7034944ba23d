//! Errors shared across Iris crates.
//!
//! Every subsystem has its own `thiserror` enum; [`Error`] wraps them so a
//! pipeline can use `?` across provider, memory and status calls alike.

use thiserror::Error;

use crate::stage::StageState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("LLM call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("memory subsystem failed: {0}")]
    Memory(#[from] MemoryError),

    #[error("tool failed: {0}")]
    Tool(#[from] ToolError),

    #[error("status reporting failed: {0}")]
    Status(#[from] StatusError),

    /// The request or the deployment lacks something the pipeline needs,
    /// e.g. a user for the memory tenant.
    #[error("misconfigured: {message}")]
    Configuration { message: String },

    #[error("JSON (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to an LLM endpoint.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("endpoint answered {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    #[error("rate limited; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("endpoint rejected the credentials: {0}")]
    AuthenticationFailed(String),

    #[error("no endpoint serves model '{0}'")]
    ModelNotFound(String),

    #[error("provider unavailable: {0}")]
    NotConfigured(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store failed: {0}")]
    Storage(String),

    #[error("could not embed text: {0}")]
    EmbeddingFailed(String),

    #[error("could not extract memories: {0}")]
    ExtractionFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no tool named '{0}'")]
    NotFound(String),

    #[error("arguments do not match the schema: {0}")]
    InvalidArguments(String),
}

/// Misuse of a status callback.
/// Transport failures are never reported this way; they are only logged.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("cannot {operation} stage '{stage}' in state {state}")]
    InvalidStateTransition {
        operation: &'static str,
        stage: String,
        state: StageState,
    },

    #[error("status callback has no stages")]
    NoStages,

    #[error("cannot create status callback: {0}")]
    Construction(String),
}
