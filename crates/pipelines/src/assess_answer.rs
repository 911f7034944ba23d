//! Judges a student's answer to a probing question about their submission.

use iris_config::AssessmentConfig;
use iris_core::domain::{ChatMessage, Verdict};
use iris_core::error::ProviderError;
use iris_core::message::Message;
use iris_core::model::{BoundModel, CompletionArguments};
use iris_core::provider::Provider;
use iris_core::token::PipelineKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::Generated;
use crate::prompts;

/// Everything the assessment looks at.
#[derive(Debug, Clone)]
pub struct AssessmentInput<'a> {
    pub question: &'a str,
    pub answer: &'a str,
    pub template_repository: &'a BTreeMap<String, String>,
    pub submission_repository: &'a BTreeMap<String, String>,
    pub problem_statement: &'a str,
    pub chat_history: &'a [ChatMessage],
    pub min_questions: u32,
    pub max_questions: u32,
    pub questions_asked: usize,
}

pub struct AssessUserAnswerPipeline {
    model: BoundModel,
    verdicts: Vec<String>,
    fallback: String,
}

impl AssessUserAnswerPipeline {
    pub fn new(llm: Arc<dyn Provider>, model: &str, config: &AssessmentConfig) -> Self {
        Self {
            model: BoundModel::new(llm, model, CompletionArguments::new(0.0, 1024)),
            verdicts: config.verdicts.clone(),
            fallback: config.fallback_verdict.clone(),
        }
    }

    pub async fn assess(&self, input: &AssessmentInput<'_>) -> Result<Generated<Verdict>, ProviderError> {
        let prompt = prompts::render(
            prompts::ASSESS_USER_ANSWER,
            &[
                ("question", input.question.to_string()),
                ("answer", input.answer.to_string()),
                ("template", prompts::format_repository(input.template_repository)),
                ("task", input.problem_statement.to_string()),
                ("files", prompts::format_repository(input.submission_repository)),
                ("chat_history", prompts::format_chat_history(input.chat_history)),
                ("questions_asked", input.questions_asked.to_string()),
                ("min_questions", input.min_questions.to_string()),
                ("max_questions", input.max_questions.to_string()),
                ("verdicts", self.verdicts.join(", ")),
            ],
        )
        .map_err(|e| ProviderError::InvalidResponse(format!("assessment prompt: {e}")))?;

        let (reply, usage) = self
            .model
            .complete_text(vec![Message::user(prompt)], PipelineKind::IrisAssessUserAnswer)
            .await?;

        let verdict = self.parse_verdict(&reply);
        info!(verdict = ?verdict.verdict, model = self.model.model(), "Answer assessed");
        Ok(Generated { value: verdict, usage })
    }

    /// The JSON object in `reply`. Verdicts outside the configured
    /// vocabulary, and unparseable replies, become the fallback verdict.
    pub fn parse_verdict(&self, reply: &str) -> Verdict {
        let parsed = match (reply.find('{'), reply.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str::<Verdict>(&reply[start..=end]).ok(),
            _ => None,
        };
        let Some(mut verdict) = parsed else {
            warn!("Assessment reply is not a verdict object");
            return Verdict {
                verdict: Some(self.fallback.clone()),
                reasoning: None,
            };
        };

        let normalized = verdict
            .verdict
            .as_deref()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| self.verdicts.contains(v));
        if normalized.is_none() {
            warn!(verdict = ?verdict.verdict, fallback = %self.fallback, "Unknown verdict");
        }
        verdict.verdict = Some(normalized.unwrap_or_else(|| self.fallback.clone()));
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response};

    fn pipeline(provider: Arc<ScriptedProvider>) -> AssessUserAnswerPipeline {
        AssessUserAnswerPipeline::new(provider, "gpt-4.1", &AssessmentConfig::default())
    }

    #[test]
    fn unknown_verdicts_fall_back() {
        let p = pipeline(Arc::new(ScriptedProvider::new(Vec::new())));
        let v = p.parse_verdict(r#"{"verdict": "sufficient", "reasoning": "ok"}"#);
        assert_eq!(v.verdict.as_deref(), Some("follow_up_question"));
        assert_eq!(v.reasoning.as_deref(), Some("ok"));

        let v = p.parse_verdict("not json at all");
        assert_eq!(v.verdict.as_deref(), Some("follow_up_question"));
        assert!(v.reasoning.is_none());
    }

    #[test]
    fn known_verdicts_are_normalized() {
        let p = pipeline(Arc::new(ScriptedProvider::new(Vec::new())));
        let v = p.parse_verdict("```json\n{\"verdict\": \" Suspicious \"}\n```");
        assert_eq!(v.verdict.as_deref(), Some("suspicious"));
    }

    #[tokio::test]
    async fn assess_uses_zero_temperature_and_tracks_tokens() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response(
            r#"{"verdict": "unsuspicious", "reasoning": "Explained the loop well."}"#,
        )]));
        let repo = BTreeMap::from([("src/Main.java".to_string(), "class Main {}".to_string())]);
        let input = AssessmentInput {
            question: "Why do you loop backwards?",
            answer: "To remove items while iterating.",
            template_repository: &BTreeMap::new(),
            submission_repository: &repo,
            problem_statement: "Implement a list filter.",
            chat_history: &[],
            min_questions: 2,
            max_questions: 5,
            questions_asked: 2,
        };

        let out = pipeline(provider.clone()).assess(&input).await.unwrap();
        assert_eq!(out.value.verdict.as_deref(), Some("unsuspicious"));
        assert_eq!(out.usage.unwrap().pipeline, PipelineKind::IrisAssessUserAnswer);

        let request = &provider.requests()[0];
        assert_eq!(request.model, "gpt-4.1");
        assert_eq!(request.max_tokens, Some(1024));
        assert!(request.temperature.abs() < f32::EPSILON);
        assert!(request.messages[0].content.contains("src/Main.java:\nclass Main {}"));
    }
}
