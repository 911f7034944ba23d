//! Read access to the student's repository snapshot.

use async_trait::async_trait;
use iris_core::error::ToolError;
use iris_core::tool::{Tool, ToolResult};
use iris_status::StatusCallback;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// File path → content, shared by both repository tools.
pub type Repository = Arc<BTreeMap<String, String>>;

pub struct RepositoryFilesTool {
    repository: Repository,
    callback: StatusCallback,
}

impl RepositoryFilesTool {
    pub fn new(repository: Repository, callback: StatusCallback) -> Self {
        Self { repository, callback }
    }
}

#[async_trait]
impl Tool for RepositoryFilesTool {
    fn name(&self) -> &str {
        "repository_files"
    }

    fn description(&self) -> &str {
        "List the files in the student's repository. Use file_lookup to read one."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: Value) -> Result<ToolResult, ToolError> {
        self.callback.progress_hint("Checking repository content ...").await;
        if self.repository.is_empty() {
            return Ok(ToolResult::text("No repository content available."));
        }
        let files: Vec<&str> = self.repository.keys().map(String::as_str).collect();
        Ok(ToolResult::text(files.join("\n")))
    }
}

pub struct FileLookupTool {
    repository: Repository,
    callback: StatusCallback,
}

impl FileLookupTool {
    pub fn new(repository: Repository, callback: StatusCallback) -> Self {
        Self { repository, callback }
    }
}

#[async_trait]
impl Tool for FileLookupTool {
    fn name(&self) -> &str {
        "file_lookup"
    }

    fn description(&self) -> &str {
        "Read one file of the student's repository. The path must be one listed by repository_files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file, exactly as listed by repository_files"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let Some(path) = arguments["file_path"].as_str() else {
            return Ok(ToolResult::rejected("Missing 'file_path' argument."));
        };
        self.callback
            .progress_hint(&format!("Looking into file {path} ..."))
            .await;

        match self.repository.get(path) {
            Some(content) => Ok(ToolResult::text(format!("{path}:\n{content}\n"))),
            None => Ok(ToolResult::rejected(
                "File not found or does not exist in the repository.",
            )),
        }
    }
}
