//! Data transfer objects exchanged with Artemis.
//!
//! Field names follow the Artemis wire format (camelCase). Everything that
//! Artemis may leave out is an `Option` or defaults to empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::message::Message;
use crate::stage::Stage;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sender {
    User,
    Llm,
    Artemis,
}

/// One content block of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        #[serde(rename = "textContent")]
        text_content: String,
    },
    Json {
        #[serde(rename = "jsonContent")]
        json_content: serde_json::Value,
    },
    Image {
        base64: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: Sender,
    #[serde(default)]
    pub contents: Vec<MessageContent>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn text(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            contents: vec![MessageContent::Text {
                text_content: text.into(),
            }],
            sent_at: None,
        }
    }

    /// Text of the first content block, if that block is text.
    pub fn first_text(&self) -> Option<&str> {
        match self.contents.first() {
            Some(MessageContent::Text { text_content }) => Some(text_content),
            _ => None,
        }
    }

    /// Converts into a prompt message. Non-text content is dropped.
    pub fn to_message(&self) -> Message {
        let text = self.first_text().unwrap_or_default();
        match self.sender {
            Sender::User => Message::user(text),
            Sender::Llm | Sender::Artemis => Message::assistant(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub memiris_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammingExercise {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub programming_language: Option<String>,
    #[serde(default)]
    pub problem_statement: Option<String>,
    #[serde(default)]
    pub template_repository: BTreeMap<String, String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_points: Option<f64>,
}

impl ProgrammingExercise {
    pub fn problem_statement(&self) -> &str {
        self.problem_statement.as_deref().unwrap_or_default()
    }

    /// Lower-cased language name, or "" when unknown.
    pub fn language(&self) -> String {
        self.programming_language
            .as_deref()
            .map(str::to_lowercase)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildLogEntry {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    #[serde(default)]
    pub test_case_name: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub successful: Option<bool>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub feedbacks: Vec<Feedback>,
}

impl std::fmt::Display for SubmissionResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let score = self.score.map(|s| format!("{s:.1}")).unwrap_or_else(|| "unknown".into());
        let successful = self
            .successful
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".into());
        write!(f, "score: {score}, successful: {successful}")?;
        if let Some(date) = self.completion_date {
            write!(f, ", completed: {}", date.to_rfc3339())?;
        }
        write!(f, ", feedbacks: {}", self.feedbacks.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgrammingSubmission {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repository: BTreeMap<String, String>,
    #[serde(default)]
    pub is_practice: Option<bool>,
    #[serde(default)]
    pub build_failed: Option<bool>,
    #[serde(default)]
    pub build_log_entries: Vec<BuildLogEntry>,
    #[serde(default)]
    pub latest_result: Option<SubmissionResult>,
}

/// Per-run settings Artemis attaches to every pipeline request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSettings {
    /// The run id; doubles as the bearer token for status callbacks.
    pub authentication_token: String,
    pub artemis_base_url: String,
    #[serde(default = "default_variant")]
    pub variant: String,
}

fn default_variant() -> String {
    "default".into()
}

/// Event attached by Artemis when a run was triggered by something other
/// than a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub event: serde_json::Value,
}

/// Outcome of assessing a student's answer to a probing question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseChatRequest {
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub user: Option<User>,
    pub course: Course,
    #[serde(default)]
    pub exercise: Option<ProgrammingExercise>,
    #[serde(default)]
    pub submission: Option<ProgrammingSubmission>,
    #[serde(default)]
    pub settings: Option<PipelineSettings>,
    #[serde(default)]
    pub initial_stages: Vec<Stage>,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptUserRequest {
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub user: Option<User>,
    pub course: Course,
    pub exercise: ProgrammingExercise,
    pub submission: ProgrammingSubmission,
    #[serde(default)]
    pub settings: Option<PipelineSettings>,
    #[serde(default)]
    pub initial_stages: Vec<Stage>,
    #[serde(default)]
    pub min_questions: Option<u32>,
    #[serde(default)]
    pub max_questions: Option<u32>,
    #[serde(default)]
    pub event_payload: Option<EventPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_artemis_chat_message() {
        let json = r#"{
            "sender": "USER",
            "contents": [{"type": "text", "textContent": "Why does my build fail?"}],
            "sentAt": "2025-05-01T10:00:00Z"
        }"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender, Sender::User);
        assert_eq!(msg.first_text(), Some("Why does my build fail?"));
    }

    #[test]
    fn first_text_ignores_non_text_first_block() {
        let msg = ChatMessage {
            sender: Sender::User,
            contents: vec![
                MessageContent::Image { base64: "AAAA".into() },
                MessageContent::Text { text_content: "later".into() },
            ],
            sent_at: None,
        };
        assert_eq!(msg.first_text(), None);
        assert_eq!(msg.to_message().content, "");
    }

    #[test]
    fn exercise_chat_request_minimal() {
        let json = r#"{"course": {"id": 3}}"#;
        let req: ExerciseChatRequest = serde_json::from_str(json).unwrap();
        assert!(req.chat_history.is_empty());
        assert!(req.user.is_none());
        assert!(req.initial_stages.is_empty());
    }

    #[test]
    fn settings_default_variant() {
        let json = r#"{"authenticationToken": "run-1", "artemisBaseUrl": "https://artemis.example"}"#;
        let settings: PipelineSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.variant, "default");
    }

    #[test]
    fn submission_result_display() {
        let result = SubmissionResult {
            completion_date: None,
            successful: Some(false),
            score: Some(42.0),
            feedbacks: vec![],
        };
        assert_eq!(result.to_string(), "score: 42.0, successful: false, feedbacks: 0");
    }
}
