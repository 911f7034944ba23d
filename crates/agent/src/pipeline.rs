//! The agent pipeline state machine.
//!
//! [`run_pipeline`] drives one request through a fixed lifecycle:
//!
//! 1. **Init**: acquire storage, resolve the tenant
//! 2. **History**: keep the last `history_window` messages, find the latest user text
//! 3. **Model**: bind the variant's agent model
//! 4. **Prompt**: system message + history + agent scratchpad
//! 5. **Tools**: build the per-run tool registry
//! 6. **Memory fork**: optionally start background memory creation
//! 7. **Pre hook**
//! 8. **Agent**: run the tool-calling loop, keep the last non-empty output
//! 9. **Post hook**: refine, cite, suggest (pipeline specific)
//! 10. **Memory join**: wait for the background task and report its memories
//!
//! Init errors are returned. Everything after Init is caught here and
//! reported as a failed run; nothing escapes to the caller.

use async_trait::async_trait;
use iris_core::domain::{ChatMessage, Sender};
use iris_core::memory::Tenant;
use iris_core::model::{BoundModel, CompletionArguments};
use iris_core::token::PipelineKind;
use iris_core::tool::ToolRegistry;
use iris_core::Result;
use iris_status::{StatusCallback, StatusExtras};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::context::PipelineContext;
use crate::executor::{AgentExecutor, AgentStep};
use crate::prompt::ChatPrompt;
use crate::state::ExecutionState;
use crate::variant::AgentVariant;

pub const WAITING_FOR_MEMORIES: &str = "Waiting for memory creation to finish ...";
pub const MEMORIES_CREATED: &str = "Memory creation finished.";
pub const NO_MEMORY_TASK: &str = "No memory creation thread started.";
pub const FATAL_ERROR: &str = "Fatal error.";

#[async_trait]
pub trait AgentPipeline: Send + Sync + Sized {
    type Request: Send + Sync;
    type Variant: AgentVariant;
    /// Extra per-run state the hooks share.
    type Extra: Default + Send + Sync;

    fn context(&self) -> &PipelineContext;

    fn chat_history<'a>(&self, request: &'a Self::Request) -> &'a [ChatMessage];

    /// Fails with a configuration error when the request has no user.
    fn resolve_tenant(&self, request: &Self::Request) -> Result<Tenant>;

    async fn is_memory_creation_enabled(&self, state: &ExecutionState<Self>) -> bool;

    async fn get_tools(&self, state: &ExecutionState<Self>) -> Result<ToolRegistry>;

    async fn build_system_message(&self, state: &ExecutionState<Self>) -> Result<String>;

    /// Tag for the agent's own token usage.
    fn token_pipeline(&self) -> PipelineKind {
        PipelineKind::NotSet
    }

    fn agent_parameters(&self, _state: &ExecutionState<Self>) -> CompletionArguments {
        let pipeline = &self.context().config.pipeline;
        CompletionArguments::new(pipeline.temperature, pipeline.max_tokens)
    }

    fn history_window(&self) -> usize {
        self.context().config.pipeline.history_window
    }

    /// Text of the most recent user message, or "" when there is none.
    fn latest_user_text(&self, history: &[ChatMessage]) -> String {
        history
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .and_then(ChatMessage::first_text)
            .unwrap_or_default()
            .to_string()
    }

    fn assemble_prompt(&self, system_message: &str, history: &[ChatMessage]) -> ChatPrompt {
        ChatPrompt::assemble(system_message, history)
    }

    /// Runs after tools are built. May replace `state.prompt`; the agent
    /// runs on whatever prompt is there afterwards.
    async fn pre_agent_hook(&self, _state: &mut ExecutionState<Self>) -> Result<()> {
        Ok(())
    }

    /// Returns the new result.
    async fn post_agent_hook(&self, state: &mut ExecutionState<Self>) -> Result<String> {
        Ok(state.result.clone())
    }

    /// Called after every agent step. Errors are logged and ignored.
    async fn on_agent_step(&self, _state: &ExecutionState<Self>, _step: &AgentStep) -> Result<()> {
        Ok(())
    }
}

/// The last `window` messages of `history`, in order.
pub fn recent_history(history: &[ChatMessage], window: usize) -> Vec<ChatMessage> {
    history[history.len().saturating_sub(window)..].to_vec()
}

/// Run `request` through `pipeline`, reporting progress on `callback`.
pub async fn run_pipeline<P: AgentPipeline>(
    pipeline: &P,
    request: P::Request,
    variant: P::Variant,
    callback: StatusCallback,
    event: Option<String>,
) -> Result<()> {
    let mut state = ExecutionState::init(pipeline, request, variant, callback, event).await?;
    info!(
        run_id = state.callback.run_id(),
        tenant = %state.memory.tenant(),
        variant = state.variant.id(),
        "Pipeline run started"
    );

    if let Err(e) = execute(pipeline, &mut state).await {
        error!(run_id = state.callback.run_id(), error = %e, "Pipeline run failed");
        if let Some(task) = state.background_memory_task.take() {
            let discarded = task.join().await;
            debug!(count = discarded.len(), "Discarded memories of failed run");
        }
        state.callback.error(FATAL_ERROR, Some(&e)).await;
        return Ok(());
    }

    info!(
        run_id = state.callback.run_id(),
        tokens = state.tokens().len(),
        "Pipeline run finished"
    );
    Ok(())
}

async fn execute<P: AgentPipeline>(pipeline: &P, state: &mut ExecutionState<P>) -> Result<()> {
    let history = pipeline.chat_history(&state.request);
    state.message_history = recent_history(history, pipeline.history_window());
    state.latest_user_text = pipeline.latest_user_text(&state.message_history);

    let model = BoundModel::new(
        pipeline.context().llm.clone(),
        state.variant.agent_model(),
        pipeline.agent_parameters(state),
    );
    state.model = Some(model.clone());

    let system_message = pipeline.build_system_message(state).await?;
    let prompt = pipeline.assemble_prompt(&system_message, &state.message_history);
    state.prompt = Some(prompt.clone());

    state.tools = Arc::new(pipeline.get_tools(state).await?);
    debug!(run_id = state.callback.run_id(), tools = ?state.tools.names(), "Tools ready");

    if pipeline.is_memory_creation_enabled(state).await {
        let task = state
            .memory
            .create_memories_in_background(state.latest_user_text.clone());
        state.background_memory_task = Some(task);
    }

    pipeline.pre_agent_hook(state).await?;

    // The pre hook may have rebuilt the prompt.
    let prompt = state.prompt.clone().unwrap_or(prompt);
    state.result = run_agent(pipeline, state, model, prompt).await;

    state.result = pipeline.post_agent_hook(state).await?;

    join_memory_task(state).await
}

async fn run_agent<P: AgentPipeline>(
    pipeline: &P,
    state: &mut ExecutionState<P>,
    model: BoundModel,
    prompt: ChatPrompt,
) -> String {
    let mut executor = AgentExecutor::new(model, prompt, state.tools.clone(), pipeline.token_pipeline())
        .with_max_iterations(pipeline.context().config.pipeline.max_iterations);

    let mut output = String::new();
    while let Some(step) = executor.next_step().await {
        match step {
            Ok(step) => {
                state.track_tokens(step.usage.clone());
                if let Err(e) = pipeline.on_agent_step(state, &step).await {
                    warn!(run_id = state.callback.run_id(), error = %e, "Agent step hook failed");
                }
                if let Some(text) = step.output.filter(|t| !t.is_empty()) {
                    output = text;
                }
            }
            Err(e) => {
                error!(run_id = state.callback.run_id(), error = %e, "Agent step failed");
                break;
            }
        }
    }
    debug!(
        run_id = state.callback.run_id(),
        iterations = executor.iterations(),
        "Agent finished"
    );
    output
}

async fn join_memory_task<P: AgentPipeline>(state: &mut ExecutionState<P>) -> Result<()> {
    match state.background_memory_task.take() {
        Some(task) => {
            state.callback.in_progress(WAITING_FOR_MEMORIES).await?;
            state.background_memory_results = task.join().await;
            state
                .callback
                .done(
                    MEMORIES_CREATED,
                    StatusExtras::new().with_created_memories(state.background_memory_results.clone()),
                )
                .await?;
        }
        None => {
            state
                .callback
                .done(NO_MEMORY_TASK, StatusExtras::new().with_created_memories(Vec::new()))
                .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response};
    use iris_config::AppConfig;
    use iris_core::error::MemoryError;
    use iris_core::memory::{Memory, MemoryCreator};
    use iris_core::message::Role;
    use iris_core::StageState;
    use iris_memory::{DatabaseHandle, VectorDatabase};
    use iris_status::{MEMORY_STAGE, PipelineFeature, RecordingTransport};
    use std::time::Duration;

    struct TestRequest {
        user_id: Option<i64>,
        history: Vec<ChatMessage>,
        memory: bool,
        system_fails: bool,
    }

    impl TestRequest {
        fn new(history: Vec<ChatMessage>) -> Self {
            Self {
                user_id: Some(1),
                history,
                memory: false,
                system_fails: false,
            }
        }
    }

    #[derive(Clone)]
    struct TestVariant;

    impl AgentVariant for TestVariant {
        fn id(&self) -> &str {
            "default"
        }
        fn name(&self) -> &str {
            "Default"
        }
        fn description(&self) -> &str {
            "Test variant"
        }
        fn agent_model(&self) -> &str {
            "gpt-4.1-mini"
        }
    }

    struct TestPipeline {
        context: PipelineContext,
    }

    #[async_trait]
    impl AgentPipeline for TestPipeline {
        type Request = TestRequest;
        type Variant = TestVariant;
        type Extra = ();

        fn context(&self) -> &PipelineContext {
            &self.context
        }

        fn chat_history<'a>(&self, request: &'a TestRequest) -> &'a [ChatMessage] {
            &request.history
        }

        fn resolve_tenant(&self, request: &TestRequest) -> Result<Tenant> {
            request
                .user_id
                .map(Tenant::for_user)
                .ok_or_else(|| iris_core::Error::configuration("missing user"))
        }

        async fn is_memory_creation_enabled(&self, state: &ExecutionState<Self>) -> bool {
            state.request.memory
        }

        async fn get_tools(&self, _state: &ExecutionState<Self>) -> Result<ToolRegistry> {
            Ok(ToolRegistry::new())
        }

        async fn build_system_message(&self, state: &ExecutionState<Self>) -> Result<String> {
            if state.request.system_fails {
                return Err(iris_core::Error::Internal("template missing".into()));
            }
            Ok("You are a {helpful} tutor.".into())
        }

        async fn post_agent_hook(&self, state: &mut ExecutionState<Self>) -> Result<String> {
            state
                .callback
                .done("Done!", StatusExtras::new().with_result(state.result.clone()))
                .await?;
            state.callback.skip("No suggestions.").await?;
            Ok(state.result.clone())
        }
    }

    struct SlowCreator;

    #[async_trait]
    impl MemoryCreator for SlowCreator {
        async fn create_memories(&self, _tenant: &Tenant, text: &str) -> std::result::Result<Vec<Memory>, MemoryError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(vec![Memory::new("Latest message", text)])
        }
    }

    fn pipeline(provider: Arc<ScriptedProvider>) -> TestPipeline {
        let database = DatabaseHandle::with_database(VectorDatabase::in_memory());
        let context = PipelineContext::new(Arc::new(AppConfig::default()), provider, database)
            .with_memory_creator(Arc::new(SlowCreator));
        TestPipeline { context }
    }

    fn callback() -> (StatusCallback, RecordingTransport) {
        let transport = RecordingTransport::new();
        let callback = StatusCallback::new(
            PipelineFeature::ExerciseChat,
            "run-1",
            "http://artemis.test",
            Vec::new(),
            Arc::new(transport.clone()),
        )
        .unwrap();
        (callback, transport)
    }

    fn numbered_history(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| {
                let sender = if i % 2 == 0 { Sender::User } else { Sender::Llm };
                ChatMessage::text(sender, format!("message {i}"))
            })
            .collect()
    }

    #[test]
    fn recent_history_keeps_the_tail() {
        let history = numbered_history(4);
        assert_eq!(recent_history(&history, 15), history);
        assert_eq!(recent_history(&history, 2), history[2..].to_vec());
        assert!(recent_history(&history, 0).is_empty());
    }

    #[tokio::test]
    async fn only_the_history_window_reaches_the_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Hi!")]));
        let (callback, _) = callback();
        let request = TestRequest::new(numbered_history(20));

        run_pipeline(&pipeline(provider.clone()), request, TestVariant, callback, None)
            .await
            .unwrap();

        let messages = &provider.requests()[0].messages;
        assert_eq!(messages.len(), 16);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "You are a {helpful} tutor.");
        let contents: Vec<_> = messages[1..].iter().map(|m| m.content.clone()).collect();
        let expected: Vec<_> = (5..20).map(|i| format!("message {i}")).collect();
        assert_eq!(contents, expected);
    }

    #[tokio::test]
    async fn without_memory_the_join_reports_no_task() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Answer")]));
        let (callback, transport) = callback();

        run_pipeline(&pipeline(provider), TestRequest::new(numbered_history(1)), TestVariant, callback, None)
            .await
            .unwrap();

        let messages = transport.messages();
        assert!(!messages.iter().any(|m| m == WAITING_FOR_MEMORIES));
        assert_eq!(messages.last().map(String::as_str), Some(NO_MEMORY_TASK));
        let done_with_result: Vec<_> = transport
            .updates()
            .into_iter()
            .filter(|u| u.result.as_deref() == Some("Answer"))
            .collect();
        assert_eq!(done_with_result.len(), 1);
    }

    #[tokio::test]
    async fn background_memories_are_joined_before_the_last_done() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("Answer")]));
        let (callback, transport) = callback();
        let mut request = TestRequest::new(vec![ChatMessage::text(Sender::User, "I study physics")]);
        request.memory = true;

        run_pipeline(&pipeline(provider), request, TestVariant, callback, None)
            .await
            .unwrap();

        let messages = transport.messages();
        let waiting = messages.iter().position(|m| m == WAITING_FOR_MEMORIES).unwrap();
        let finished = messages.iter().position(|m| m == MEMORIES_CREATED).unwrap();
        assert!(waiting < finished);
        assert_eq!(finished, messages.len() - 1);

        let last = transport.last().unwrap();
        let memory_stage = last.stages.iter().find(|s| s.name == MEMORY_STAGE).unwrap();
        assert_eq!(memory_stage.state, StageState::Done);
        let created = last.created_memories.as_ref().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].content, "I study physics");
    }

    #[tokio::test]
    async fn failing_system_message_fails_the_run_once() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let (callback, transport) = callback();
        let mut request = TestRequest::new(numbered_history(2));
        request.system_fails = true;

        let outcome = run_pipeline(&pipeline(provider.clone()), request, TestVariant, callback, None).await;
        assert!(outcome.is_ok());
        assert!(provider.requests().is_empty());

        let updates = transport.updates();
        assert_eq!(updates.len(), 1);
        let stages = &updates[0].stages;
        assert_eq!(stages[0].state, StageState::Error);
        assert_eq!(stages[0].message.as_deref(), Some(FATAL_ERROR));
        assert!(stages[1..].iter().all(|s| s.state == StageState::Skipped));
    }

    #[tokio::test]
    async fn missing_user_fails_init() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let (callback, transport) = callback();
        let mut request = TestRequest::new(Vec::new());
        request.user_id = None;

        let err = run_pipeline(&pipeline(provider), request, TestVariant, callback, None)
            .await
            .unwrap_err();
        assert!(matches!(err, iris_core::Error::Configuration { .. }));
        assert!(transport.updates().is_empty());
    }

    #[tokio::test]
    async fn agent_errors_leave_an_empty_result() {
        // No scripted response: the first agent step fails.
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let (callback, transport) = callback();

        run_pipeline(&pipeline(provider), TestRequest::new(Vec::new()), TestVariant, callback, None)
            .await
            .unwrap();

        let last = transport.last().unwrap();
        assert!(last.stages.iter().all(|s| s.state != StageState::Error));
        assert_eq!(transport.messages()[0], "Done!");
    }
}
