//! Exercise dates and due-date status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iris_core::domain::ProgrammingExercise;
use iris_core::error::ToolError;
use iris_core::tool::{Tool, ToolResult};
use iris_status::StatusCallback;
use serde_json::{Map, Value, json};

pub struct ExerciseDetailsTool {
    exercise: Option<ProgrammingExercise>,
    callback: StatusCallback,
}

impl ExerciseDetailsTool {
    pub fn new(exercise: Option<ProgrammingExercise>, callback: StatusCallback) -> Self {
        Self { exercise, callback }
    }

    fn details(&self, now: DateTime<Utc>) -> Map<String, Value> {
        let start = self.exercise.as_ref().and_then(|e| e.start_date);
        let end = self.exercise.as_ref().and_then(|e| e.end_date);

        let mut details = Map::new();
        details.insert("current_date".into(), json!(now.to_rfc3339()));
        details.insert(
            "start_date".into(),
            json!(start.map(|d| d.to_rfc3339()).unwrap_or_else(|| "No start date provided".into())),
        );
        details.insert(
            "end_date".into(),
            json!(end.map(|d| d.to_rfc3339()).unwrap_or_else(|| "No end date provided".into())),
        );
        details.insert("due_date_over".into(), json!(end.is_some_and(|d| d < now)));
        details
    }
}

#[async_trait]
impl Tool for ExerciseDetailsTool {
    fn name(&self) -> &str {
        "get_additional_exercise_details"
    }

    fn description(&self) -> &str {
        "Get the start date, end date and whether the due date is over for the current exercise."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        self.callback.progress_hint("Reading exercise details...").await;
        let details = self.details(Utc::now());
        Ok(ToolResult::text(serde_json::to_string_pretty(&details).unwrap_or_default()))
    }
}
