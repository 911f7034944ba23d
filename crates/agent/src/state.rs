use iris_core::domain::ChatMessage;
use iris_core::memory::Memory;
use iris_core::model::BoundModel;
use iris_core::scratch::Scratchpad;
use iris_core::token::TokenUsage;
use iris_core::tool::ToolRegistry;
use iris_core::Result;
use iris_memory::{MemoryCoordinator, MemoryCreationTask, VectorDatabase};
use iris_status::StatusCallback;
use std::sync::Arc;

use crate::pipeline::AgentPipeline;
use crate::prompt::ChatPrompt;

/// Everything one pipeline run works on. Created by [`ExecutionState::init`]
/// and dropped when the run ends; never shared between runs.
pub struct ExecutionState<P: AgentPipeline> {
    pub request: P::Request,
    pub variant: P::Variant,
    pub callback: StatusCallback,
    /// Event that triggered the run, if it was not a chat message.
    pub event: Option<String>,
    pub database: Arc<VectorDatabase>,
    pub memory: MemoryCoordinator,

    pub message_history: Vec<ChatMessage>,
    pub latest_user_text: String,
    pub model: Option<BoundModel>,
    pub prompt: Option<ChatPrompt>,
    pub tools: Arc<ToolRegistry>,

    pub result: String,
    pub background_memory_task: Option<MemoryCreationTask>,
    pub background_memory_results: Vec<Memory>,
    pub scratch: Scratchpad,

    /// Pipeline-specific state, such as the assessed verdict.
    pub extra: P::Extra,

    tokens: Vec<TokenUsage>,
}

impl<P: AgentPipeline> ExecutionState<P> {
    /// Acquire the storage handle and resolve the tenant. Errors here are
    /// returned to the caller; there is no run to report them on yet.
    pub async fn init(
        pipeline: &P,
        request: P::Request,
        variant: P::Variant,
        callback: StatusCallback,
        event: Option<String>,
    ) -> Result<Self> {
        let context = pipeline.context();
        let database = context.database.acquire().await?;
        let tenant = pipeline.resolve_tenant(&request)?;
        let memory = context.memory_coordinator(tenant, &database);

        Ok(Self {
            request,
            variant,
            callback,
            event,
            database,
            memory,
            message_history: Vec::new(),
            latest_user_text: String::new(),
            model: None,
            prompt: None,
            tools: Arc::new(ToolRegistry::new()),
            result: String::new(),
            background_memory_task: None,
            background_memory_results: Vec::new(),
            scratch: Scratchpad::new(),
            extra: P::Extra::default(),
            tokens: Vec::new(),
        })
    }

    /// Record the usage of an LLM call, if the provider reported one.
    pub fn track_tokens(&mut self, usage: Option<TokenUsage>) {
        if let Some(usage) = usage {
            self.tokens.push(usage);
        }
    }

    pub fn tokens(&self) -> &[TokenUsage] {
        &self.tokens
    }
}
