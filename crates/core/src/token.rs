//! Token accounting for every LLM call in a run.

use serde::{Deserialize, Serialize};

/// Which (sub-)pipeline issued an LLM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineKind {
    IrisChatExerciseAgentMessage,
    IrisPromptUserAgentMessage,
    IrisRefinement,
    IrisCitationPipeline,
    IrisInteractionSuggestion,
    IrisAssessUserAnswer,
    IrisMemoryCreation,
    NotSet,
}

/// A single usage record, as Artemis expects it in status updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub model: String,
    pub num_input_tokens: u32,
    pub num_output_tokens: u32,
    pub pipeline: PipelineKind,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.num_input_tokens + self.num_output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case_with_pipeline_tag() {
        let usage = TokenUsage {
            model: "gpt-4.1-mini".into(),
            num_input_tokens: 120,
            num_output_tokens: 30,
            pipeline: PipelineKind::IrisRefinement,
        };
        let json = serde_json::to_value(&usage).unwrap();
        assert_eq!(json["numInputTokens"], 120);
        assert_eq!(json["pipeline"], "IRIS_REFINEMENT");
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn only_implemented_pipelines_are_tagged() {
        let kind: PipelineKind = serde_json::from_str("\"IRIS_ASSESS_USER_ANSWER\"").unwrap();
        assert_eq!(kind, PipelineKind::IrisAssessUserAnswer);
        assert!(serde_json::from_str::<PipelineKind>("\"IRIS_ASK_USER\"").is_err());
    }
}
