//! The prompt-user pipeline: asks students about their own submission.
//!
//! Each run first judges the student's answer to the previous question (if
//! there is one), then lets the agent ask the next question. The verdict is
//! published with the final result so Artemis can act on it.

use async_trait::async_trait;
use chrono::Utc;
use iris_agent::{AgentPipeline, AgentStep, ExecutionState, PipelineContext, run_pipeline};
use iris_core::domain::{ChatMessage, PromptUserRequest, Sender, Verdict};
use iris_core::memory::Tenant;
use iris_core::retrieval::ContentKind;
use iris_core::token::PipelineKind;
use iris_core::tool::ToolRegistry;
use iris_core::{Error, Result};
use iris_status::{StatusCallback, StatusExtras};
use iris_tools::{ContentRetrievalTool, register_submission_tools};
use tracing::{debug, info, warn};

use crate::assess_answer::{AssessUserAnswerPipeline, AssessmentInput};
use crate::refinement::RefinementPipeline;
use crate::variant::PromptUserVariant;
use crate::{THINKING, has_content, prompts, tenant_for};

/// The only event that carries an answer to assess.
pub const USER_ANSWER_EVENT: &str = "user_answer";

#[derive(Debug, Default)]
pub struct PromptUserExtra {
    pub verdict: Option<Verdict>,
}

pub struct PromptUserPipeline {
    context: PipelineContext,
    refinement: RefinementPipeline,
}

impl PromptUserPipeline {
    pub fn new(context: PipelineContext) -> Self {
        let refinement = RefinementPipeline::new(context.llm.clone(), &context.config.pipeline.refinement_model);
        Self { context, refinement }
    }

    /// Without an explicit `event` the type of the request's event payload
    /// is used.
    pub async fn run(
        &self,
        request: PromptUserRequest,
        variant: PromptUserVariant,
        callback: StatusCallback,
        event: Option<String>,
    ) -> Result<()> {
        let event = event.or_else(|| request.event_payload.as_ref().map(|p| p.event_type.clone()));
        info!(run_id = callback.run_id(), variant = %variant.id, ?event, "Running prompt-user pipeline");
        run_pipeline(self, request, variant, callback, event).await
    }

    fn expects_question(&self, verdict: Option<&Verdict>) -> bool {
        match verdict.and_then(|v| v.verdict.as_deref()) {
            None => true,
            Some(v) => v == self.context.config.assessment.follow_up_verdict,
        }
    }

    async fn assess(&self, state: &mut ExecutionState<Self>, question: &str, answer: &str) -> Result<()> {
        state.callback.in_progress("Assessing answer ...").await?;

        let config = &self.context.config.assessment;
        let request = &state.request;
        let assessment = AssessUserAnswerPipeline::new(self.context.llm.clone(), &state.variant.assessment_model, config);
        let input = AssessmentInput {
            question,
            answer,
            template_repository: &request.exercise.template_repository,
            submission_repository: &request.submission.repository,
            problem_statement: request.exercise.problem_statement(),
            chat_history: &state.message_history,
            min_questions: request.min_questions.unwrap_or(config.min_questions),
            max_questions: request.max_questions.unwrap_or(config.max_questions),
            questions_asked: request.chat_history.iter().filter(|m| m.sender == Sender::Llm).count(),
        };

        let outcome = assessment.assess(&input).await;
        match outcome {
            Ok(verdict) => {
                state.track_tokens(verdict.usage);
                state.extra.verdict = Some(verdict.value);
                state
                    .callback
                    .done(
                        "Answer assessed.",
                        StatusExtras::new()
                            .with_verdict(state.extra.verdict.clone())
                            .with_tokens(state.tokens().to_vec()),
                    )
                    .await?;
            }
            Err(e) => {
                warn!(run_id = state.callback.run_id(), error = %e, "Answer assessment failed");
                state.callback.skip("Answer assessment failed.").await?;
            }
        }
        Ok(())
    }
}

/// The last question the agent asked and the student's reply to it, when
/// the history ends with such an exchange.
fn last_exchange(history: &[ChatMessage]) -> Option<(&str, &str)> {
    let (answer, earlier) = history.split_last()?;
    if answer.sender != Sender::User {
        return None;
    }
    let question = earlier.last().filter(|m| m.sender == Sender::Llm)?;
    Some((question.first_text()?, answer.first_text()?))
}

fn format_verdict(verdict: Option<&Verdict>) -> String {
    match verdict {
        Some(Verdict {
            verdict: Some(v),
            reasoning: Some(r),
        }) => format!("{v} ({r})"),
        Some(Verdict { verdict: Some(v), .. }) => v.clone(),
        _ => String::new(),
    }
}

#[async_trait]
impl AgentPipeline for PromptUserPipeline {
    type Request = PromptUserRequest;
    type Variant = PromptUserVariant;
    type Extra = PromptUserExtra;

    fn context(&self) -> &PipelineContext {
        &self.context
    }

    fn chat_history<'a>(&self, request: &'a PromptUserRequest) -> &'a [ChatMessage] {
        &request.chat_history
    }

    fn resolve_tenant(&self, request: &PromptUserRequest) -> Result<Tenant> {
        tenant_for(request.user.as_ref())
    }

    fn token_pipeline(&self) -> PipelineKind {
        PipelineKind::IrisPromptUserAgentMessage
    }

    async fn is_memory_creation_enabled(&self, _state: &ExecutionState<Self>) -> bool {
        false
    }

    async fn get_tools(&self, state: &ExecutionState<Self>) -> Result<ToolRegistry> {
        let request = &state.request;
        let mut tools = ToolRegistry::new();
        register_submission_tools(
            &mut tools,
            &state.callback,
            Some(&request.exercise),
            Some(&request.submission),
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
        Ok(tools)
    }

    async fn build_system_message(&self, state: &ExecutionState<Self>) -> Result<String> {
        let exercise = &state.request.exercise;
        let conversation_note = if state.message_history.is_empty() {
            "No question has been asked yet. Ask the first one."
        } else if state.extra.verdict.is_some() {
            "The student answered your last question. React to the assessment below and, if another question is needed, ask it."
        } else {
            "Continue the conversation with the next question."
        };

        prompts::render(
            prompts::PROMPT_USER_SYSTEM,
            &[
                ("current_date", prompts::datetime_to_string(Utc::now())),
                ("exercise_title", exercise.name.clone()),
                ("programming_language", exercise.language()),
                ("problem_statement", exercise.problem_statement().to_string()),
                ("conversation_note", conversation_note.to_string()),
                ("event_instructions", prompts::event_instructions(state.event.as_deref()).to_string()),
                ("verdict", format_verdict(state.extra.verdict.as_ref())),
            ],
        )
        .map_err(|e| Error::Internal(format!("prompt-user system prompt: {e}")))
    }

    async fn pre_agent_hook(&self, state: &mut ExecutionState<Self>) -> Result<()> {
        let answers_expected = state.event.as_deref().is_none_or(|e| e == USER_ANSWER_EVENT);
        let exchange = last_exchange(&state.request.chat_history)
            .filter(|_| answers_expected)
            .map(|(q, a)| (q.to_string(), a.to_string()));

        match exchange {
            Some((question, answer)) => {
                self.assess(state, &question, &answer).await?;
                if state.extra.verdict.is_some() {
                    let system_message = self.build_system_message(state).await?;
                    state.prompt = Some(self.assemble_prompt(&system_message, &state.message_history));
                }
                Ok(())
            }
            None => {
                debug!(run_id = state.callback.run_id(), event = ?state.event, "Nothing to assess");
                state.callback.skip("No answer to assess.").await?;
                Ok(())
            }
        }
    }

    async fn on_agent_step(&self, state: &ExecutionState<Self>, step: &AgentStep) -> Result<()> {
        if !step.intermediate_steps.is_empty() {
            state.callback.in_progress(THINKING).await?;
        }
        Ok(())
    }

    async fn post_agent_hook(&self, state: &mut ExecutionState<Self>) -> Result<String> {
        let mut result = state.result.clone();

        if self.expects_question(state.extra.verdict.as_ref()) && !result.trim().is_empty() {
            state.callback.in_progress("Refining response ...").await?;
            let exercise = &state.request.exercise;
            let guide = prompts::render(
                prompts::PROMPT_USER_GUIDE,
                &[
                    ("programming_language", exercise.language()),
                    ("problem_statement", exercise.problem_statement().to_string()),
                ],
            )
            .map_err(|e| Error::Internal(e.to_string()))?;

            match self.refinement.refine(&guide, &result).await {
                Ok(refined) => {
                    state.track_tokens(refined.usage);
                    result = refined.value;
                }
                Err(e) => warn!(run_id = state.callback.run_id(), error = %e, "Refining question failed"),
            }
        }

        state
            .callback
            .done(
                "Done!",
                StatusExtras::new()
                    .with_result(result.clone())
                    .with_tokens(state.tokens().to_vec())
                    .with_verdict(state.extra.verdict.clone()),
            )
            .await?;
        Ok(result)
    }
}
