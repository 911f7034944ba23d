//! Follow-up questions the student could ask next.

use iris_core::domain::ChatMessage;
use iris_core::error::ProviderError;
use iris_core::message::Message;
use iris_core::model::{BoundModel, CompletionArguments};
use iris_core::provider::Provider;
use iris_core::token::PipelineKind;
use std::sync::Arc;
use tracing::warn;

use crate::Generated;
use crate::prompts;

pub const MAX_SUGGESTIONS: usize = 3;

pub struct InteractionSuggestionPipeline {
    model: BoundModel,
}

impl InteractionSuggestionPipeline {
    pub fn new(llm: Arc<dyn Provider>, model: &str) -> Self {
        Self {
            model: BoundModel::new(llm, model, CompletionArguments::new(0.2, 500)),
        }
    }

    pub async fn suggest(
        &self,
        history: &[ChatMessage],
        last_message: &str,
    ) -> Result<Generated<Vec<String>>, ProviderError> {
        let prompt = prompts::render(
            prompts::INTERACTION_SUGGESTIONS,
            &[
                ("chat_history", prompts::format_chat_history(history)),
                ("last_message", last_message.to_string()),
            ],
        )
        .map_err(|e| ProviderError::InvalidResponse(format!("suggestion prompt: {e}")))?;

        let (reply, usage) = self
            .model
            .complete_text(vec![Message::user(prompt)], PipelineKind::IrisInteractionSuggestion)
            .await?;
        Ok(Generated {
            value: parse_suggestions(&reply),
            usage,
        })
    }
}

/// The JSON array in `reply`, trimmed to [`MAX_SUGGESTIONS`] non-empty
/// entries. Anything else yields no suggestions.
pub fn parse_suggestions(reply: &str) -> Vec<String> {
    let array = match (reply.find('['), reply.rfind(']')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            warn!("Suggestion reply contains no JSON array");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<String>>(array) {
        Ok(suggestions) => suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(MAX_SUGGESTIONS)
            .collect(),
        Err(e) => {
            warn!(error = %e, "Suggestion reply is not a list of strings");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response};
    use iris_core::domain::Sender;

    #[test]
    fn parses_fenced_arrays() {
        let reply = "```json\n[\"Why?\", \" \", \"How?\", \"What?\", \"Where?\"]\n```";
        assert_eq!(parse_suggestions(reply), vec!["Why?", "How?", "What?"]);
    }

    #[test]
    fn non_arrays_yield_nothing() {
        assert!(parse_suggestions("I have no suggestions.").is_empty());
        assert!(parse_suggestions("[1, 2]").is_empty());
        assert!(parse_suggestions("] before [").is_empty());
    }

    #[tokio::test]
    async fn suggest_tracks_usage() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(r#"["What is a base case?"]"#)]));
        let pipeline = InteractionSuggestionPipeline::new(provider.clone(), "gpt-4.1-mini");
        let history = vec![ChatMessage::text(Sender::User, "How does recursion work?")];

        let out = pipeline.suggest(&history, "It calls itself.").await.unwrap();
        assert_eq!(out.value, vec!["What is a base case?"]);
        assert_eq!(out.usage.unwrap().pipeline, PipelineKind::IrisInteractionSuggestion);
        assert!(provider.requests()[0].messages[0].content.contains("USER: How does recursion work?"));
    }
}
