//! Tools the agent may call while answering.
//!
//! Tools let the agent look at the student's submission, the exercise,
//! course content and the student's memories. A pipeline builds its
//! [`ToolRegistry`] once per run; it does not change while the agent loop
//! is running.

use crate::error::ToolError;
use crate::provider::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed tool invocation, ready to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Echoes the model's `tool_call.id`.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    /// False when the tool turned the input down. The output still goes
    /// back to the model.
    pub success: bool,
    pub output: String,
}

impl ToolResult {
    /// A successful result; the registry fills in `call_id`.
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
        }
    }

    pub fn rejected(output: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::text(output)
        }
    }
}

/// Something the agent can look at.
///
/// Bad model input is answered with a descriptive [`ToolResult::rejected`]
/// so the model can correct itself. `Err` means the tool itself is broken.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by, e.g. `file_lookup`.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The tools of one agent run, keyed and ordered by name so the prompt
/// lists them the same way every time.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A later tool with the same name wins.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let Some(tool) = self.tools.get(&call.name) else {
            return Err(ToolError::NotFound(call.name.clone()));
        };
        let result = tool.execute(call.arguments.clone()).await?;
        Ok(ToolResult {
            call_id: call.id.clone(),
            ..result
        })
    }
}
