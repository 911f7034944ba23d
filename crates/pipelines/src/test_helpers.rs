//! Test fixtures: a scripted provider, a pipeline context and Artemis requests.

use iris_core::domain::{
    ChatMessage, Course, ExerciseChatRequest, PipelineSettings, ProgrammingExercise, ProgrammingSubmission,
    PromptUserRequest, Sender, User,
};
use async_trait::async_trait;
use iris_agent::PipelineContext;
use iris_config::AppConfig;
use iris_core::error::{MemoryError, ProviderError};
use iris_core::memory::{Memory, MemoryCreator, Tenant};
use iris_core::message::{Message, MessageToolCall};
use iris_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::{BTreeMap, VecDeque};
use iris_memory::{DatabaseHandle, VectorDatabase};
use iris_status::{PipelineFeature, RecordingTransport, StatusCallback};
use std::sync::{Arc, Mutex};

/// Answers with queued responses in order and records every request.
/// An exhausted script answers with an error.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidResponse("script exhausted".into()))
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["gpt-4.1".into(), "gpt-4.1-mini".into()])
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "gpt-4.1-mini".into(),
    }
}

pub fn tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_tool_calls(tool_calls),
        usage: usage(),
        model: "gpt-4.1-mini".into(),
    }
}

pub fn tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}

pub const COURSE_ID: i64 = 1;

struct NoMemories;

#[async_trait]
impl MemoryCreator for NoMemories {
    async fn create_memories(&self, _tenant: &Tenant, _text: &str) -> Result<Vec<Memory>, MemoryError> {
        Ok(Vec::new())
    }
}

/// A context over `database` whose memory creation never calls the model.
pub fn context(provider: Arc<ScriptedProvider>, database: VectorDatabase) -> PipelineContext {
    PipelineContext::new(
        Arc::new(AppConfig::default()),
        provider,
        DatabaseHandle::with_database(database),
    )
    .with_memory_creator(Arc::new(NoMemories))
}

pub fn recording_callback(feature: PipelineFeature) -> (StatusCallback, RecordingTransport) {
    let transport = RecordingTransport::new();
    let callback = StatusCallback::new(
        feature,
        "run-1",
        "http://artemis.test",
        Vec::new(),
        Arc::new(transport.clone()),
    )
    .unwrap();
    (callback, transport)
}

pub fn user(memiris_enabled: bool) -> User {
    User {
        id: 42,
        first_name: Some("Ada".into()),
        last_name: None,
        memiris_enabled,
    }
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        authentication_token: "run-1".into(),
        artemis_base_url: "http://artemis.test".into(),
        variant: "default".into(),
    }
}

pub fn exercise() -> ProgrammingExercise {
    ProgrammingExercise {
        id: 7,
        name: "Sorting".into(),
        programming_language: Some("JAVA".into()),
        problem_statement: Some("Implement bubble sort in `Sort.sort(int[] a)`.".into()),
        template_repository: BTreeMap::from([("src/Sort.java".into(), "class Sort {}".into())]),
        start_date: None,
        end_date: None,
        max_points: Some(10.0),
    }
}

pub fn submission() -> ProgrammingSubmission {
    ProgrammingSubmission {
        id: Some(3),
        date: None,
        repository: BTreeMap::from([(
            "src/Sort.java".into(),
            "class Sort { static void sort(int[] a) { for (int i = a.length - 1; i > 0; i--) {} } }".into(),
        )]),
        is_practice: Some(false),
        build_failed: Some(false),
        build_log_entries: Vec::new(),
        latest_result: None,
    }
}

pub fn chat_request(user: Option<User>, question: &str) -> ExerciseChatRequest {
    ExerciseChatRequest {
        chat_history: vec![ChatMessage::text(Sender::User, question)],
        user,
        course: Course {
            id: COURSE_ID,
            name: Some("Intro to Programming".into()),
        },
        exercise: Some(exercise()),
        submission: Some(submission()),
        settings: Some(settings()),
        initial_stages: Vec::new(),
        custom_instructions: None,
    }
}

pub fn prompt_user_request(history: Vec<ChatMessage>) -> PromptUserRequest {
    PromptUserRequest {
        chat_history: history,
        user: Some(user(false)),
        course: Course {
            id: COURSE_ID,
            name: None,
        },
        exercise: exercise(),
        submission: submission(),
        settings: Some(settings()),
        initial_stages: Vec::new(),
        min_questions: None,
        max_questions: None,
        event_payload: None,
    }
}
