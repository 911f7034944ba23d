//! The per-run stage machine.
//!
//! Stages advance through a single pointer that only moves forward. A stage
//! goes NOT_STARTED → IN_PROGRESS → DONE | ERROR | SKIPPED and never leaves
//! a terminal state. The first `error` marks every later stage SKIPPED and
//! freezes the run.

use iris_core::error::StatusError;
use iris_core::memory::MemorySummary;
use iris_core::{Stage, StageState};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::feature::PipelineFeature;
use crate::telemetry::{ErrorTelemetry, TracingTelemetry};
use crate::transport::StatusTransport;
use crate::update::{StatusExtras, StatusUpdate};

const API_PATH: &str = "api/iris/public/pyris/pipelines";
const SKIPPED_AFTER_ERROR: &str = "Skipped due to previous error";

/// Handle to a run's status. Clones address the same run.
#[derive(Clone)]
pub struct StatusCallback {
    inner: Arc<Inner>,
}

struct Inner {
    run_id: String,
    url: String,
    feature: PipelineFeature,
    transport: Arc<dyn StatusTransport>,
    telemetry: Arc<dyn ErrorTelemetry>,
    // Held across publishes so Artemis sees updates in transition order.
    board: Mutex<Board>,
}

struct Board {
    status: StatusUpdate,
    current: usize,
    failed: bool,
}

impl Board {
    fn stage(&mut self) -> &mut Stage {
        &mut self.status.stages[self.current]
    }

    fn invalid(&self, operation: &'static str) -> StatusError {
        let stage = &self.status.stages[self.current];
        StatusError::InvalidStateTransition {
            operation,
            stage: stage.name.clone(),
            state: stage.state,
        }
    }

    /// Moves the pointer forward. Stays on the last stage when exhausted.
    fn advance(&mut self, start_next: bool, next_message: Option<String>) {
        if self.current + 1 >= self.status.stages.len() {
            return;
        }
        self.current += 1;
        let stage = self.stage();
        if let Some(message) = next_message {
            stage.message = Some(message);
        }
        if start_next {
            stage.state = StageState::InProgress;
        }
    }
}

impl StatusCallback {
    /// Creates the callback for one run. `initial_stages` are stages Artemis
    /// already ran; they stay in front and are never touched.
    pub fn new(
        feature: PipelineFeature,
        run_id: impl Into<String>,
        base_url: &str,
        initial_stages: Vec<Stage>,
        transport: Arc<dyn StatusTransport>,
    ) -> Result<Self, StatusError> {
        let run_id = run_id.into();
        if run_id.is_empty() {
            return Err(StatusError::Construction("empty run id".into()));
        }
        let base = reqwest::Url::parse(base_url)
            .map_err(|e| StatusError::Construction(format!("invalid base url '{base_url}': {e}")))?;
        let url = format!(
            "{}/{API_PATH}/{}/runs/{run_id}/status",
            base.as_str().trim_end_matches('/'),
            feature.path()
        );

        let current = initial_stages.len();
        let mut stages = initial_stages;
        stages.extend(feature.stages());
        if current >= stages.len() {
            return Err(StatusError::NoStages);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                run_id,
                url,
                feature,
                transport,
                telemetry: Arc::new(TracingTelemetry),
                board: Mutex::new(Board {
                    status: StatusUpdate::new(stages),
                    current,
                    failed: false,
                }),
            }),
        })
    }

    /// Replace the error sink. Only valid before the handle is cloned.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn ErrorTelemetry>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.telemetry = telemetry;
        }
        self
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn feature(&self) -> PipelineFeature {
        self.inner.feature
    }

    /// Copy of the full current status.
    pub async fn snapshot(&self) -> StatusUpdate {
        self.inner.board.lock().await.status.clone()
    }

    pub async fn current_stage(&self) -> Stage {
        let board = self.inner.board.lock().await;
        board.status.stages[board.current].clone()
    }

    pub async fn has_failed(&self) -> bool {
        self.inner.board.lock().await.failed
    }

    async fn publish(&self, status: &StatusUpdate) {
        if let Err(e) = self
            .inner
            .transport
            .publish(&self.inner.url, &self.inner.run_id, status)
            .await
        {
            error!(run_id = %self.inner.run_id, error = %e, "Error sending status update");
        }
    }

    /// Marks the current stage IN_PROGRESS with `message`.
    pub async fn in_progress(&self, message: &str) -> Result<(), StatusError> {
        let mut board = self.inner.board.lock().await;
        let state = board.stage().state;
        match state {
            StageState::NotStarted | StageState::InProgress => {
                let stage = board.stage();
                stage.state = StageState::InProgress;
                stage.message = Some(message.to_string());
            }
            _ => return Err(board.invalid("in_progress")),
        }
        debug!(run_id = %self.inner.run_id, message, "Stage in progress");
        self.publish(&board.status).await;
        Ok(())
    }

    /// Like [`in_progress`](Self::in_progress) but only logs on failure.
    /// Tools use this; a hint must never break a tool call.
    pub async fn progress_hint(&self, message: &str) {
        if let Err(e) = self.in_progress(message).await {
            warn!(run_id = %self.inner.run_id, error = %e, "Dropped progress hint");
        }
    }

    /// Completes the current stage, publishes `extras` once, and moves on.
    pub async fn done(&self, message: &str, extras: StatusExtras) -> Result<(), StatusError> {
        let shape = self.inner.feature.shape();
        let mut board = self.inner.board.lock().await;
        if board.stage().state.is_terminal() {
            return Err(board.invalid("done"));
        }

        let stage = board.stage();
        stage.state = StageState::Done;
        stage.message = Some(message.to_string());

        let status = &mut board.status;
        if let Some(tokens) = extras.tokens {
            status.tokens = tokens;
        }
        status.result = extras.result;
        if shape.suggestions {
            status.suggestions = extras.suggestions;
        }
        if shape.verdict {
            status.verdict = extras.verdict;
        }
        if shape.memories {
            status.accessed_memories =
                Some(extras.accessed_memories.iter().map(MemorySummary::from).collect());
            status.created_memories =
                Some(extras.created_memories.iter().map(MemorySummary::from).collect());
        }

        board.advance(extras.start_next_stage, extras.next_stage_message);
        debug!(run_id = %self.inner.run_id, message, "Stage done");
        self.publish(&board.status).await;
        board.status.clear_payload();
        Ok(())
    }

    /// Skips the current stage and moves on.
    pub async fn skip(&self, message: &str) -> Result<(), StatusError> {
        let mut board = self.inner.board.lock().await;
        if board.stage().state.is_terminal() {
            return Err(board.invalid("skip"));
        }
        let stage = board.stage();
        stage.state = StageState::Skipped;
        stage.message = Some(message.to_string());
        board.status.result = None;
        board.status.suggestions = None;
        board.advance(true, None);
        debug!(run_id = %self.inner.run_id, message, "Stage skipped");
        self.publish(&board.status).await;
        Ok(())
    }

    /// Fails the run. Every later stage becomes SKIPPED and the pointer
    /// moves to the last stage. Only the first call has an effect.
    pub async fn error(&self, message: &str, cause: Option<&(dyn std::error::Error + Send + Sync + 'static)>) {
        let mut board = self.inner.board.lock().await;
        if board.failed {
            warn!(run_id = %self.inner.run_id, message, "Ignoring error on an already failed run");
            return;
        }
        board.failed = true;

        let failed_stage = board.stage().name.clone();
        if !board.stage().state.is_terminal() {
            let stage = board.stage();
            stage.state = StageState::Error;
            stage.message = Some(message.to_string());
        }
        let rest = board.current + 1;
        for stage in board.status.stages.iter_mut().skip(rest) {
            stage.state = StageState::Skipped;
            stage.message = Some(SKIPPED_AFTER_ERROR.to_string());
        }
        board.current = board.status.stages.len() - 1;
        board.status.clear_payload();

        self.publish(&board.status).await;
        drop(board);

        error!(
            run_id = %self.inner.run_id,
            stage = %failed_stage,
            message,
            "Error occurred in job"
        );
        self.inner
            .telemetry
            .capture(&self.inner.run_id, &failed_stage, message, cause);
    }
}

impl std::fmt::Debug for StatusCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCallback")
            .field("run_id", &self.inner.run_id)
            .field("url", &self.inner.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingTransport;
    use iris_core::domain::Verdict;
    use iris_core::memory::Memory;
    use iris_core::{PipelineKind, TokenUsage};
    use std::sync::Mutex as StdMutex;

    fn callback(feature: PipelineFeature) -> (StatusCallback, RecordingTransport) {
        let transport = RecordingTransport::new();
        let cb = StatusCallback::new(
            feature,
            "run-1",
            "https://artemis.example/",
            Vec::new(),
            Arc::new(transport.clone()),
        )
        .unwrap();
        (cb, transport)
    }

    fn states(update: &StatusUpdate) -> Vec<StageState> {
        update.stages.iter().map(|s| s.state).collect()
    }

    fn usage() -> TokenUsage {
        TokenUsage {
            model: "gpt-4.1-mini".into(),
            num_input_tokens: 10,
            num_output_tokens: 5,
            pipeline: PipelineKind::IrisChatExerciseAgentMessage,
        }
    }

    #[test]
    fn url_follows_artemis_layout() {
        let (cb, _) = callback(PipelineFeature::ExerciseChat);
        assert_eq!(
            cb.url(),
            "https://artemis.example/api/iris/public/pyris/pipelines/programming-exercise-chat/runs/run-1/status"
        );
    }

    #[test]
    fn invalid_base_url_fails_construction() {
        let err = StatusCallback::new(
            PipelineFeature::PromptUser,
            "run-1",
            "not a url",
            Vec::new(),
            Arc::new(RecordingTransport::new()),
        )
        .unwrap_err();
        assert!(matches!(err, StatusError::Construction(_)));
    }

    #[tokio::test]
    async fn initial_stages_stay_in_front() {
        let mut done = Stage::new("Preparing", 10);
        done.state = StageState::Done;
        let transport = RecordingTransport::new();
        let cb = StatusCallback::new(
            PipelineFeature::ExerciseChat,
            "run-2",
            "https://artemis.example",
            vec![done],
            Arc::new(transport.clone()),
        )
        .unwrap();

        cb.in_progress("Thinking ...").await.unwrap();
        let update = transport.last().unwrap();
        assert_eq!(update.stages.len(), 4);
        assert_eq!(update.stages[0].state, StageState::Done);
        assert_eq!(update.stages[1].state, StageState::InProgress);
    }

    #[tokio::test]
    async fn done_advances_and_starts_next() {
        let (cb, transport) = callback(PipelineFeature::ExerciseChat);
        cb.done("Done!", StatusExtras::new().with_result("answer").with_tokens(vec![usage()]))
            .await
            .unwrap();

        let update = transport.last().unwrap();
        assert_eq!(
            states(&update),
            vec![StageState::Done, StageState::InProgress, StageState::NotStarted]
        );
        assert_eq!(update.result.as_deref(), Some("answer"));
        assert_eq!(update.tokens.len(), 1);
    }

    #[tokio::test]
    async fn payload_is_sent_once_but_tokens_persist() {
        let (cb, transport) = callback(PipelineFeature::ExerciseChat);
        cb.done("Done!", StatusExtras::new().with_result("answer").with_tokens(vec![usage()]))
            .await
            .unwrap();
        cb.done("Suggestions", StatusExtras::new().with_suggestions(vec!["Why?".into()]))
            .await
            .unwrap();

        let update = transport.last().unwrap();
        assert!(update.result.is_none());
        assert_eq!(update.suggestions.as_deref(), Some(&["Why?".to_string()][..]));
        assert_eq!(update.tokens.len(), 1);
    }

    #[tokio::test]
    async fn next_stage_can_stay_unstarted() {
        let (cb, transport) = callback(PipelineFeature::PromptUser);
        cb.done(
            "Answer assessed.",
            StatusExtras::new()
                .with_next_stage_message("Waiting")
                .without_starting_next(),
        )
        .await
        .unwrap();
        let update = transport.last().unwrap();
        assert_eq!(update.stages[1].state, StageState::NotStarted);
        assert_eq!(update.stages[1].message.as_deref(), Some("Waiting"));
    }

    #[tokio::test]
    async fn shape_filters_fields() {
        let (cb, transport) = callback(PipelineFeature::PromptUser);
        let verdict = Verdict {
            verdict: Some("unsuspicious".into()),
            reasoning: Some("Explained the loop invariant.".into()),
        };
        cb.done(
            "Answer assessed.",
            StatusExtras::new()
                .with_verdict(Some(verdict.clone()))
                .with_suggestions(vec!["ignored".into()]),
        )
        .await
        .unwrap();
        let update = transport.last().unwrap();
        assert_eq!(update.verdict, Some(verdict));
        assert!(update.suggestions.is_none());
    }

    #[tokio::test]
    async fn in_progress_on_finished_stage_is_invalid() {
        let (cb, _) = callback(PipelineFeature::ExerciseChat);
        cb.done("a", StatusExtras::new()).await.unwrap();
        cb.done("b", StatusExtras::new()).await.unwrap();
        cb.done("c", StatusExtras::new()).await.unwrap();
        // pointer is exhausted and sits on the DONE memory stage
        let err = cb.in_progress("late").await.unwrap_err();
        assert!(matches!(err, StatusError::InvalidStateTransition { operation: "in_progress", .. }));
        assert!(cb.done("again", StatusExtras::new()).await.is_err());
    }

    #[tokio::test]
    async fn skip_advances() {
        let (cb, transport) = callback(PipelineFeature::ExerciseChat);
        cb.done("Done!", StatusExtras::new()).await.unwrap();
        cb.skip("Skipping suggestion generation as no output was generated.")
            .await
            .unwrap();
        let update = transport.last().unwrap();
        assert_eq!(
            states(&update),
            vec![StageState::Done, StageState::Skipped, StageState::InProgress]
        );
    }

    #[tokio::test]
    async fn error_skips_rest_and_is_final() {
        let (cb, transport) = callback(PipelineFeature::ExerciseChat);
        cb.in_progress("Thinking ...").await.unwrap();
        cb.error("Fatal error.", None).await;

        let update = transport.last().unwrap();
        assert_eq!(
            states(&update),
            vec![StageState::Error, StageState::Skipped, StageState::Skipped]
        );
        assert_eq!(update.stages[1].message.as_deref(), Some(SKIPPED_AFTER_ERROR));

        let published = transport.updates().len();
        cb.error("Fatal error.", None).await;
        assert_eq!(transport.updates().len(), published);
        assert!(cb.in_progress("more").await.is_err());
        assert!(cb.done("more", StatusExtras::new()).await.is_err());
        assert!(cb.skip("more").await.is_err());
    }

    #[tokio::test]
    async fn stages_never_move_backwards() {
        let (cb, transport) = callback(PipelineFeature::ExerciseChat);
        cb.in_progress("Thinking ...").await.unwrap();
        cb.done("Done!", StatusExtras::new()).await.unwrap();
        let _ = cb.in_progress("Creating suggestions ...").await;
        cb.done("Suggested", StatusExtras::new()).await.unwrap();
        cb.error("late failure", None).await;

        let rank = |s: StageState| match s {
            StageState::NotStarted => 0,
            StageState::InProgress => 1,
            _ => 2,
        };
        let updates = transport.updates();
        for pair in updates.windows(2) {
            for (before, after) in pair[0].stages.iter().zip(&pair[1].stages) {
                assert!(rank(after.state) >= rank(before.state));
                if before.state.is_terminal() {
                    assert_eq!(before.state, after.state);
                }
            }
        }
    }

    #[tokio::test]
    async fn transport_failure_is_swallowed() {
        let cb = StatusCallback::new(
            PipelineFeature::ExerciseChat,
            "run-3",
            "https://artemis.example",
            Vec::new(),
            Arc::new(RecordingTransport::failing()),
        )
        .unwrap();
        assert!(cb.in_progress("Thinking ...").await.is_ok());
        assert!(cb.done("Done!", StatusExtras::new()).await.is_ok());
    }

    struct CapturingTelemetry(StdMutex<Vec<(String, bool)>>);

    impl ErrorTelemetry for CapturingTelemetry {
        fn capture(
            &self,
            _run_id: &str,
            stage: &str,
            _message: &str,
            cause: Option<&(dyn std::error::Error + Send + Sync + 'static)>,
        ) {
            self.0.lock().unwrap().push((stage.to_string(), cause.is_some()));
        }
    }

    #[tokio::test]
    async fn error_forwards_cause_to_telemetry() {
        let telemetry = Arc::new(CapturingTelemetry(StdMutex::new(Vec::new())));
        let cb = StatusCallback::new(
            PipelineFeature::ExerciseChat,
            "run-4",
            "https://artemis.example",
            Vec::new(),
            Arc::new(RecordingTransport::new()),
        )
        .unwrap()
        .with_telemetry(telemetry.clone());

        let cause = std::io::Error::other("boom");
        cb.error("Fatal error.", Some(&cause)).await;
        let captured = telemetry.0.lock().unwrap();
        assert_eq!(captured.as_slice(), &[("Checking available information".to_string(), true)]);
    }

    #[tokio::test]
    async fn memories_are_summarised() {
        let (cb, transport) = callback(PipelineFeature::ExerciseChat);
        let memory = Memory::new("Prefers Java", "The user prefers Java examples.");
        cb.done("Done!", StatusExtras::new().with_accessed_memories(vec![memory.clone()]))
            .await
            .unwrap();
        let update = transport.last().unwrap();
        let accessed = update.accessed_memories.unwrap();
        assert_eq!(accessed[0].id, memory.id.to_string());
        assert_eq!(update.created_memories, Some(Vec::new()));
    }
}
