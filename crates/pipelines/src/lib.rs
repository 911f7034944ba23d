//! The concrete Iris pipelines.
//!
//! - [`ExerciseChatPipeline`] answers students' questions about a programming
//!   exercise, then refines, cites and suggests follow-ups.
//! - [`PromptUserPipeline`] asks students about their own submission and
//!   assesses their answers.
//!
//! Both are [`AgentPipeline`](iris_agent::AgentPipeline)s; the sub-pipelines
//! they use (refinement, citation, suggestions, answer assessment) are plain
//! structs around a bound model.

pub mod assess_answer;
pub mod citation;
pub mod exercise_chat;
pub mod prompt_user;
pub mod prompts;
pub mod refinement;
pub mod suggestions;
pub mod variant;

#[cfg(test)]
mod test_helpers;

use iris_core::domain::User;
use iris_core::memory::Tenant;
use iris_core::retrieval::ContentKind;
use iris_core::token::TokenUsage;
use iris_memory::VectorDatabase;
use tracing::warn;

pub use assess_answer::{AssessUserAnswerPipeline, AssessmentInput};
pub use citation::CitationPipeline;
pub use exercise_chat::ExerciseChatPipeline;
pub use prompt_user::{PromptUserExtra, PromptUserPipeline};
pub use refinement::RefinementPipeline;
pub use suggestions::InteractionSuggestionPipeline;
pub use variant::{ExerciseChatVariant, PromptUserVariant};

/// Progress message while the agent is calling tools.
pub const THINKING: &str = "Thinking ...";

/// Output of a sub-pipeline together with the usage of its LLM call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated<T> {
    pub value: T,
    pub usage: Option<TokenUsage>,
}

impl Generated<String> {
    /// `text` as is, without an LLM call.
    pub fn unchanged(text: &str) -> Self {
        Self {
            value: text.to_string(),
            usage: None,
        }
    }
}

pub(crate) fn tenant_for(user: Option<&User>) -> iris_core::Result<Tenant> {
    user.map(|u| Tenant::for_user(u.id))
        .ok_or_else(|| iris_core::Error::configuration("User is required for the memory tenant"))
}

/// Whether the course has content of `kind`. Lookup failures count as no.
pub(crate) async fn has_content(database: &VectorDatabase, course_id: i64, kind: ContentKind) -> bool {
    match database.content.has_content(course_id, kind).await {
        Ok(available) => available,
        Err(e) => {
            warn!(course_id, ?kind, error = %e, "Could not check course content");
            false
        }
    }
}
