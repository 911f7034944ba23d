//! The status document sent to Artemis and the optional payload of `done`.

use iris_core::domain::Verdict;
use iris_core::memory::{Memory, MemorySummary};
use iris_core::{Stage, TokenUsage};
use serde::{Deserialize, Serialize};

/// Full status of a run. Every publish sends the whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub tokens: Vec<TokenUsage>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessed_memories: Option<Vec<MemorySummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_memories: Option<Vec<MemorySummary>>,
}

impl StatusUpdate {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            tokens: Vec::new(),
            result: None,
            suggestions: None,
            verdict: None,
            accessed_memories: None,
            created_memories: None,
        }
    }

    /// Drops per-publish payload so it is not re-sent.
    pub(crate) fn clear_payload(&mut self) {
        self.result = None;
        self.suggestions = None;
        self.verdict = None;
        self.accessed_memories = None;
        self.created_memories = None;
    }
}

/// Optional payload of [`StatusCallback::done`](crate::StatusCallback::done).
#[derive(Debug, Clone)]
pub struct StatusExtras {
    pub result: Option<String>,
    /// Replaces the token list when set; otherwise the previous list is kept.
    pub tokens: Option<Vec<TokenUsage>>,
    pub suggestions: Option<Vec<String>>,
    pub verdict: Option<Verdict>,
    pub accessed_memories: Vec<Memory>,
    pub created_memories: Vec<Memory>,
    pub next_stage_message: Option<String>,
    pub start_next_stage: bool,
}

impl Default for StatusExtras {
    fn default() -> Self {
        Self {
            result: None,
            tokens: None,
            suggestions: None,
            verdict: None,
            accessed_memories: Vec::new(),
            created_memories: Vec::new(),
            next_stage_message: None,
            start_next_stage: true,
        }
    }
}

impl StatusExtras {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_tokens(mut self, tokens: Vec<TokenUsage>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = Some(suggestions);
        self
    }

    pub fn with_verdict(mut self, verdict: Option<Verdict>) -> Self {
        self.verdict = verdict;
        self
    }

    pub fn with_accessed_memories(mut self, memories: Vec<Memory>) -> Self {
        self.accessed_memories = memories;
        self
    }

    pub fn with_created_memories(mut self, memories: Vec<Memory>) -> Self {
        self.created_memories = memories;
        self
    }

    pub fn with_next_stage_message(mut self, message: impl Into<String>) -> Self {
        self.next_stage_message = Some(message.into());
        self
    }

    /// Leave the next stage NOT_STARTED instead of starting it.
    pub fn without_starting_next(mut self) -> Self {
        self.start_next_stage = false;
        self
    }
}
