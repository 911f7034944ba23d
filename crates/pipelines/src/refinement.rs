//! Second-pass review of the agent's answer by a small model.

use iris_core::error::ProviderError;
use iris_core::message::Message;
use iris_core::model::{BoundModel, CompletionArguments};
use iris_core::provider::Provider;
use iris_core::token::PipelineKind;
use std::sync::Arc;
use tracing::info;

use crate::Generated;

/// The reviewer's reply when the answer can stay as it is.
pub const APPROVED: &str = "!ok!";

pub struct RefinementPipeline {
    model: BoundModel,
}

impl RefinementPipeline {
    pub fn new(llm: Arc<dyn Provider>, model: &str) -> Self {
        Self {
            model: BoundModel::new(llm, model, CompletionArguments::new(0.5, 2000)),
        }
    }

    /// Review `answer` against `guide_prompt`. Returns the answer unchanged
    /// when the reviewer approves it, the rewrite otherwise.
    pub async fn refine(&self, guide_prompt: &str, answer: &str) -> Result<Generated<String>, ProviderError> {
        let messages = vec![Message::system(guide_prompt), Message::user(answer)];
        let (reply, usage) = self
            .model
            .complete_text(messages, PipelineKind::IrisRefinement)
            .await?;

        let value = if reply.contains(APPROVED) || reply.trim().is_empty() {
            info!(model = self.model.model(), "Response is ok and not rewritten");
            answer.to_string()
        } else {
            info!(model = self.model.model(), "Response is rewritten");
            reply.trim().to_string()
        };
        Ok(Generated { value, usage })
    }
}
