//! A provider bound to one model id and fixed sampling arguments.

use crate::error::ProviderError;
use crate::message::Message;
use crate::provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
use crate::token::{PipelineKind, TokenUsage};
use std::sync::Arc;

/// Sampling configuration for a bound model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionArguments {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl CompletionArguments {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens: Some(max_tokens),
        }
    }
}

impl Default for CompletionArguments {
    fn default() -> Self {
        Self::new(0.5, 2000)
    }
}

#[derive(Clone)]
pub struct BoundModel {
    provider: Arc<dyn Provider>,
    model: String,
    arguments: CompletionArguments,
}

impl BoundModel {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        arguments: CompletionArguments,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            arguments,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn arguments(&self) -> CompletionArguments {
        self.arguments
    }

    pub async fn invoke(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.arguments.temperature,
            max_tokens: self.arguments.max_tokens,
            tools,
            stop: Vec::new(),
        };
        self.provider.complete(request).await
    }

    /// Invoke without tools and return the text plus its usage record.
    pub async fn complete_text(
        &self,
        messages: Vec<Message>,
        pipeline: PipelineKind,
    ) -> Result<(String, Option<TokenUsage>), ProviderError> {
        let response = self.invoke(messages, Vec::new()).await?;
        let usage = self.usage_of(&response, pipeline);
        Ok((response.message.content, usage))
    }

    /// Converts provider usage into a record tagged with `pipeline`.
    pub fn usage_of(&self, response: &ProviderResponse, pipeline: PipelineKind) -> Option<TokenUsage> {
        response.usage.as_ref().map(|u| TokenUsage {
            model: response.model.clone(),
            num_input_tokens: u.prompt_tokens,
            num_output_tokens: u.completion_tokens,
            pipeline,
        })
    }
}

impl std::fmt::Debug for BoundModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("arguments", &self.arguments)
            .finish()
    }
}
