//! The exercise chat: answers questions about a programming exercise.

use async_trait::async_trait;
use chrono::Utc;
use iris_agent::{AgentPipeline, AgentStep, ExecutionState, PipelineContext, run_pipeline};
use iris_core::domain::{ChatMessage, ExerciseChatRequest};
use iris_core::memory::Tenant;
use iris_core::retrieval::ContentKind;
use iris_core::scratch::ScratchKind;
use iris_core::token::PipelineKind;
use iris_core::tool::ToolRegistry;
use iris_core::{Error, Result};
use iris_status::{StatusCallback, StatusExtras};
use iris_tools::{ContentRetrievalTool, register_memory_tools, register_submission_tools};
use tracing::{info, warn};

use crate::citation::CitationPipeline;
use crate::refinement::RefinementPipeline;
use crate::suggestions::InteractionSuggestionPipeline;
use crate::variant::ExerciseChatVariant;
use crate::{THINKING, has_content, prompts, tenant_for};

pub const SKIP_SUGGESTIONS: &str = "Skipping suggestion generation as no output was generated.";

pub struct ExerciseChatPipeline {
    context: PipelineContext,
    refinement: RefinementPipeline,
    citation: CitationPipeline,
    suggestions: InteractionSuggestionPipeline,
}

impl ExerciseChatPipeline {
    pub fn new(context: PipelineContext) -> Self {
        let llm = context.llm.clone();
        let small_model = context.config.pipeline.refinement_model.clone();
        Self {
            refinement: RefinementPipeline::new(llm.clone(), &small_model),
            citation: CitationPipeline::new(llm.clone()),
            suggestions: InteractionSuggestionPipeline::new(llm, &small_model),
            context,
        }
    }

    pub async fn run(
        &self,
        request: ExerciseChatRequest,
        variant: ExerciseChatVariant,
        callback: StatusCallback,
        event: Option<String>,
    ) -> Result<()> {
        info!(run_id = callback.run_id(), variant = %variant.id, ?event, "Running exercise chat pipeline");
        run_pipeline(self, request, variant, callback, event).await
    }

    fn base_url(state: &ExecutionState<Self>) -> &str {
        state
            .request
            .settings
            .as_ref()
            .map(|s| s.artemis_base_url.as_str())
            .unwrap_or_default()
    }

    async fn refine(&self, state: &mut ExecutionState<Self>, answer: String) -> Result<String> {
        if answer.trim().is_empty() {
            return Ok(answer);
        }
        state.callback.in_progress("Refining response ...").await?;

        let problem_statement = state
            .request
            .exercise
            .as_ref()
            .map(|e| e.problem_statement().to_string())
            .unwrap_or_default();
        let guide = prompts::render(prompts::EXERCISE_CHAT_GUIDE, &[("problem_statement", problem_statement)])
            .map_err(|e| Error::Internal(e.to_string()))?;

        match self.refinement.refine(&guide, &answer).await {
            Ok(refined) => {
                state.track_tokens(refined.usage);
                Ok(refined.value)
            }
            Err(e) => {
                warn!(run_id = state.callback.run_id(), error = %e, "Refining response failed");
                Ok(answer)
            }
        }
    }

    async fn add_citations(&self, state: &mut ExecutionState<Self>, answer: String) -> Result<String> {
        let mut sources = state.scratch.chunks(ScratchKind::Faqs);
        sources.extend(state.scratch.chunks(ScratchKind::LectureContent));
        if sources.is_empty() || answer.trim().is_empty() {
            return Ok(answer);
        }
        state.callback.in_progress("Augmenting response ...").await?;

        let cited = self
            .citation
            .cite(&state.variant.citation_model, &sources, &answer, Self::base_url(state))
            .await;
        match cited {
            Ok(cited) => {
                state.track_tokens(cited.usage);
                Ok(cited.value)
            }
            Err(e) => {
                warn!(run_id = state.callback.run_id(), error = %e, "Adding citations failed");
                Ok(answer)
            }
        }
    }

    async fn generate_suggestions(&self, state: &mut ExecutionState<Self>, answer: &str) -> Result<()> {
        if answer.is_empty() {
            state.callback.skip(SKIP_SUGGESTIONS).await?;
            return Ok(());
        }

        match self.suggestions.suggest(&state.request.chat_history, answer).await {
            Ok(suggestions) => {
                state.track_tokens(suggestions.usage);
                state
                    .callback
                    .done(
                        "Suggestions generated.",
                        StatusExtras::new()
                            .with_suggestions(suggestions.value)
                            .with_tokens(state.tokens().to_vec()),
                    )
                    .await?;
            }
            Err(e) => {
                warn!(run_id = state.callback.run_id(), error = %e, "Generating interaction suggestions failed");
                state.callback.skip("Generating interaction suggestions failed.").await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AgentPipeline for ExerciseChatPipeline {
    type Request = ExerciseChatRequest;
    type Variant = ExerciseChatVariant;
    type Extra = ();

    fn context(&self) -> &PipelineContext {
        &self.context
    }

    fn chat_history<'a>(&self, request: &'a ExerciseChatRequest) -> &'a [ChatMessage] {
        &request.chat_history
    }

    fn resolve_tenant(&self, request: &ExerciseChatRequest) -> Result<Tenant> {
        tenant_for(request.user.as_ref())
    }

    fn token_pipeline(&self) -> PipelineKind {
        PipelineKind::IrisChatExerciseAgentMessage
    }

    async fn is_memory_creation_enabled(&self, state: &ExecutionState<Self>) -> bool {
        self.context.config.memory.creation_enabled
            && state.request.user.as_ref().is_some_and(|u| u.memiris_enabled)
    }

    async fn get_tools(&self, state: &ExecutionState<Self>) -> Result<ToolRegistry> {
        let request = &state.request;
        let mut tools = ToolRegistry::new();
        register_submission_tools(
            &mut tools,
            &state.callback,
            request.exercise.as_ref(),
            request.submission.as_ref(),
        );

        let course_id = request.course.id;
        if has_content(&state.database, course_id, ContentKind::Lecture).await {
            tools.register(Box::new(ContentRetrievalTool::lectures(
                course_id,
                state.database.content.clone(),
                state.scratch.clone(),
                state.callback.clone(),
            )));
        }
        if has_content(&state.database, course_id, ContentKind::Faq).await {
            tools.register(Box::new(ContentRetrievalTool::faqs(
                course_id,
                state.database.content.clone(),
                state.scratch.clone(),
                state.callback.clone(),
            )));
        }

        if request.user.as_ref().is_some_and(|u| u.memiris_enabled) {
            register_memory_tools(
                &mut tools,
                &state.memory,
                &state.scratch,
                self.context.config.memory.search_limit,
            );
        }
        Ok(tools)
    }

    async fn build_system_message(&self, state: &ExecutionState<Self>) -> Result<String> {
        let request = &state.request;
        let exercise = request.exercise.as_ref();

        let has_query = !state.latest_user_text.is_empty();
        let has_history = !state.message_history.is_empty();
        let conversation_note = match (has_query, has_history) {
            (true, _) => "Answer the student's latest message, taking the earlier conversation into account.",
            (false, true) => "The student has not asked anything new. Continue the conversation where it left off.",
            (false, false) => "This is the start of the conversation. Greet the student and offer help with the exercise.",
        };

        prompts::render(
            prompts::EXERCISE_CHAT_SYSTEM,
            &[
                ("current_date", prompts::datetime_to_string(Utc::now())),
                ("exercise_title", exercise.map(|e| e.name.clone()).unwrap_or_default()),
                ("programming_language", exercise.map(|e| e.language()).unwrap_or_default()),
                (
                    "problem_statement",
                    exercise.map(|e| e.problem_statement().to_string()).unwrap_or_default(),
                ),
                ("conversation_note", conversation_note.to_string()),
                ("event_instructions", prompts::event_instructions(state.event.as_deref()).to_string()),
                (
                    "custom_instructions",
                    prompts::format_custom_instructions(request.custom_instructions.as_deref().unwrap_or_default()),
                ),
            ],
        )
        .map_err(|e| Error::Internal(format!("exercise chat system prompt: {e}")))
    }

    async fn on_agent_step(&self, state: &ExecutionState<Self>, step: &AgentStep) -> Result<()> {
        if !step.intermediate_steps.is_empty() {
            state.callback.in_progress(THINKING).await?;
        }
        Ok(())
    }

    async fn post_agent_hook(&self, state: &mut ExecutionState<Self>) -> Result<String> {
        let result = state.result.clone();
        let result = self.refine(state, result).await?;
        let result = self.add_citations(state, result).await?;

        state
            .callback
            .done(
                "Done!",
                StatusExtras::new()
                    .with_result(result.clone())
                    .with_tokens(state.tokens().to_vec())
                    .with_accessed_memories(state.scratch.memories(ScratchKind::AccessedMemories)),
            )
            .await?;

        self.generate_suggestions(state, &result).await?;
        Ok(result)
    }
}
