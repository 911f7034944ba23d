//! Tools that describe the student's latest submission.

use async_trait::async_trait;
use iris_core::domain::ProgrammingSubmission;
use iris_core::error::ToolError;
use iris_core::tool::{Tool, ToolResult};
use iris_status::StatusCallback;
use serde_json::{Map, Value, json};

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn missing(key: &str) -> Value {
    Value::String(format!("No {} is provided", key.replace('_', " ")))
}

pub struct SubmissionDetailsTool {
    submission: Option<ProgrammingSubmission>,
    callback: StatusCallback,
}

impl SubmissionDetailsTool {
    pub fn new(submission: Option<ProgrammingSubmission>, callback: StatusCallback) -> Self {
        Self { submission, callback }
    }
}

#[async_trait]
impl Tool for SubmissionDetailsTool {
    fn name(&self) -> &str {
        "get_submission_details"
    }

    fn description(&self) -> &str {
        "Get key facts about the student's latest submission: submission_date, is_practice, \
         build_failed and latest_result."
    }

    fn parameters_schema(&self) -> Value {
        no_arguments()
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        self.callback.progress_hint("Reading submission details...").await;

        let s = self.submission.as_ref();
        let fields: [(&str, Option<String>); 4] = [
            ("submission_date", s.and_then(|s| s.date).map(|d| d.to_rfc3339())),
            ("is_practice", s.and_then(|s| s.is_practice).map(|b| b.to_string())),
            ("build_failed", s.and_then(|s| s.build_failed).map(|b| b.to_string())),
            ("latest_result", s.and_then(|s| s.latest_result.as_ref()).map(|r| r.to_string())),
        ];

        let details: Map<String, Value> = fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.map(Value::String).unwrap_or_else(|| missing(key))))
            .collect();
        Ok(ToolResult::text(serde_json::to_string_pretty(&details).unwrap_or_default()))
    }
}

pub struct BuildLogsTool {
    submission: Option<ProgrammingSubmission>,
    callback: StatusCallback,
}

impl BuildLogsTool {
    pub fn new(submission: Option<ProgrammingSubmission>, callback: StatusCallback) -> Self {
        Self { submission, callback }
    }
}

#[async_trait]
impl Tool for BuildLogsTool {
    fn name(&self) -> &str {
        "get_build_logs_analysis"
    }

    fn description(&self) -> &str {
        "Get the build log of the latest submission. Use it when the build failed to find \
         compiler errors."
    }

    fn parameters_schema(&self) -> Value {
        no_arguments()
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        self.callback.progress_hint("Analyzing build logs ...").await;

        let Some(submission) = self.submission.as_ref().filter(|s| s.build_failed == Some(true)) else {
            return Ok(ToolResult::text("No build failed. The last build was successful."));
        };
        if submission.build_log_entries.is_empty() {
            return Ok(ToolResult::text("The build failed, but no build logs are available."));
        }

        let lines: Vec<String> = submission
            .build_log_entries
            .iter()
            .map(|entry| match entry.timestamp {
                Some(ts) => format!("{}: {}", ts.to_rfc3339(), entry.message),
                None => entry.message.clone(),
            })
            .collect();
        Ok(ToolResult::text(lines.join("\n")))
    }
}

pub struct FeedbacksTool {
    submission: Option<ProgrammingSubmission>,
    callback: StatusCallback,
}

impl FeedbacksTool {
    pub fn new(submission: Option<ProgrammingSubmission>, callback: StatusCallback) -> Self {
        Self { submission, callback }
    }
}

#[async_trait]
impl Tool for FeedbacksTool {
    fn name(&self) -> &str {
        "get_feedbacks"
    }

    fn description(&self) -> &str {
        "Get the automated test feedback of the latest submission: test case name, credits \
         and failure message for every test."
    }

    fn parameters_schema(&self) -> Value {
        no_arguments()
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        self.callback.progress_hint("Analysing feedbacks ...").await;

        let feedbacks = self
            .submission
            .as_ref()
            .and_then(|s| s.latest_result.as_ref())
            .map(|r| r.feedbacks.as_slice())
            .unwrap_or_default();
        if feedbacks.is_empty() {
            return Ok(ToolResult::text("No feedbacks available."));
        }

        let lines: Vec<String> = feedbacks
            .iter()
            .map(|f| {
                format!(
                    "Case: {}. Credits: {}. Info: {}",
                    f.test_case_name.as_deref().unwrap_or("unnamed"),
                    f.credits,
                    f.text.as_deref().unwrap_or("-")
                )
            })
            .collect();
        Ok(ToolResult::text(lines.join("\n")))
    }
}
