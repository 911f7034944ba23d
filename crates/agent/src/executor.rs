//! The tool-calling agent loop.
//!
//! Each call to [`AgentExecutor::next_step`] is one model call:
//!
//! 1. Render the prompt with the tool-call messages gathered so far
//! 2. Send it to the bound model with the tool definitions
//! 3. **If tool calls**: run them in order, remember their results, and
//!    return a step carrying the intermediate steps
//! 4. **If text**: return a final step carrying the output and stop
//!
//! The loop ends after the final answer or after `max_iterations` model calls.

use iris_core::message::Message;
use iris_core::model::BoundModel;
use iris_core::token::{PipelineKind, TokenUsage};
use iris_core::tool::{ToolCall, ToolRegistry};
use iris_core::Error;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::prompt::ChatPrompt;

/// One tool invocation inside a step.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateStep {
    pub tool: String,
    pub input: Value,
    pub output: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStep {
    /// The final answer. Only set on the last step.
    pub output: Option<String>,
    pub intermediate_steps: Vec<IntermediateStep>,
    pub usage: Option<TokenUsage>,
}

pub struct AgentExecutor {
    model: BoundModel,
    prompt: ChatPrompt,
    tools: Arc<ToolRegistry>,
    pipeline: PipelineKind,
    max_iterations: usize,
    scratchpad: Vec<Message>,
    iteration: usize,
    finished: bool,
}

impl AgentExecutor {
    pub fn new(model: BoundModel, prompt: ChatPrompt, tools: Arc<ToolRegistry>, pipeline: PipelineKind) -> Self {
        Self {
            model,
            prompt,
            tools,
            pipeline,
            max_iterations: 10,
            scratchpad: Vec::new(),
            iteration: 0,
            finished: false,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn iterations(&self) -> usize {
        self.iteration
    }

    /// Run the next step. `None` once the agent has answered, failed or
    /// exhausted its iterations.
    pub async fn next_step(&mut self) -> Option<Result<AgentStep, Error>> {
        if self.finished {
            return None;
        }
        if self.iteration >= self.max_iterations {
            warn!(
                model = self.model.model(),
                iterations = self.iteration,
                "Max agent iterations reached without a final answer"
            );
            self.finished = true;
            return None;
        }
        self.iteration += 1;

        let step = self.step().await;
        if step.is_err() {
            self.finished = true;
        }
        Some(step)
    }

    async fn step(&mut self) -> Result<AgentStep, Error> {
        let messages = self
            .prompt
            .render(&self.scratchpad)
            .map_err(|e| Error::Internal(format!("prompt rendering failed: {e}")))?;
        debug!(
            model = self.model.model(),
            iteration = self.iteration,
            messages = messages.len(),
            "Agent step"
        );

        let response = self.model.invoke(messages, self.tools.definitions()).await?;
        let usage = self.model.usage_of(&response, self.pipeline);

        if !response.message.requests_tools() {
            self.finished = true;
            return Ok(AgentStep {
                output: Some(response.message.content),
                intermediate_steps: Vec::new(),
                usage,
            });
        }

        let tool_calls = response.message.tool_calls.clone();
        self.scratchpad.push(response.message);

        let mut intermediate_steps = Vec::with_capacity(tool_calls.len());
        for tc in &tool_calls {
            let arguments = serde_json::from_str(&tc.arguments).unwrap_or_else(|e| {
                warn!(tool = %tc.name, error = %e, "Malformed tool arguments; calling with none");
                Value::Object(Default::default())
            });
            let call = ToolCall {
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments,
            };

            let output = match self.tools.execute(&call).await {
                Ok(result) => result.output,
                Err(e) => {
                    warn!(tool = %tc.name, error = %e, "Tool execution failed");
                    // Fed back so the model can recover.
                    format!("Error: {e}")
                }
            };
            debug!(tool = %tc.name, bytes = output.len(), "Tool executed");

            self.scratchpad.push(Message::tool_result(&tc.id, &output));
            intermediate_steps.push(IntermediateStep {
                tool: call.name,
                input: call.arguments,
                output,
            });
        }

        Ok(AgentStep {
            output: None,
            intermediate_steps,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, tool_call, tool_call_response, text_response};
    use iris_core::error::ToolError;
    use iris_core::message::{MessageToolCall, Role};
    use iris_core::model::CompletionArguments;
    use iris_core::tool::{Tool, ToolResult};

    struct UpperTool;

    #[async_trait::async_trait]
    impl Tool for UpperTool {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Upper-case a text"
        }
        fn parameters_schema(&self) -> Value {
            serde_json::json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }
        async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
            let text = arguments["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("text".into()))?;
            Ok(ToolResult::text(text.to_uppercase()))
        }
    }

    fn executor(provider: Arc<ScriptedProvider>) -> AgentExecutor {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(UpperTool));
        let model = BoundModel::new(provider, "gpt-4.1-mini", CompletionArguments::default());
        AgentExecutor::new(
            model,
            ChatPrompt::assemble("system", &[]),
            Arc::new(tools),
            PipelineKind::IrisChatExerciseAgentMessage,
        )
    }

    #[tokio::test]
    async fn tool_step_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(vec![tool_call("upper", serde_json::json!({"text": "abc"}))]),
            text_response("ABC it is"),
        ]));
        let mut exec = executor(provider.clone());

        let first = exec.next_step().await.unwrap().unwrap();
        assert_eq!(first.output, None);
        assert_eq!(first.intermediate_steps[0].output, "ABC");
        assert_eq!(first.usage.unwrap().pipeline, PipelineKind::IrisChatExerciseAgentMessage);

        let second = exec.next_step().await.unwrap().unwrap();
        assert_eq!(second.output.as_deref(), Some("ABC it is"));
        assert!(exec.next_step().await.is_none());

        // The second call saw the tool call and its result after the system prompt.
        let seen = provider.requests();
        let last = &seen[1].messages;
        assert_eq!(last.len(), 3);
        assert_eq!(last[2].role, Role::Tool);
        assert_eq!(last[2].content, "ABC");
    }

    #[tokio::test]
    async fn tool_errors_are_fed_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(vec![
                tool_call("upper", serde_json::json!({})),
                tool_call("missing_tool", serde_json::json!({})),
            ]),
            text_response("done"),
        ]));
        let mut exec = executor(provider);

        let step = exec.next_step().await.unwrap().unwrap();
        assert!(step.intermediate_steps[0].output.starts_with("Error: "));
        assert!(step.intermediate_steps[1].output.contains("missing_tool"));
    }

    #[tokio::test]
    async fn malformed_arguments_reach_the_tool_as_empty_object() {
        let garbled = MessageToolCall {
            id: "call_9".into(),
            name: "upper".into(),
            arguments: "{\"text\": \"abc\"".into(),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(vec![garbled]),
            text_response("sorry"),
        ]));
        let mut exec = executor(provider.clone());

        let step = exec.next_step().await.unwrap().unwrap();
        assert_eq!(step.intermediate_steps[0].input, serde_json::json!({}));
        assert!(step.intermediate_steps[0].output.starts_with("Error: "));

        exec.next_step().await.unwrap().unwrap();
        let fed_back = &provider.requests()[1].messages[2];
        assert_eq!(fed_back.tool_call_id.as_deref(), Some("call_9"));
    }

    #[tokio::test]
    async fn stops_after_max_iterations() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_call_response(vec![tool_call("upper", serde_json::json!({"text": "a"}))]),
            tool_call_response(vec![tool_call("upper", serde_json::json!({"text": "b"}))]),
            text_response("never reached"),
        ]));
        let mut exec = executor(provider).with_max_iterations(2);

        let mut outputs = Vec::new();
        while let Some(step) = exec.next_step().await {
            outputs.push(step.unwrap().output);
        }
        assert_eq!(outputs, vec![None, None]);
        assert_eq!(exec.iterations(), 2);
    }

    #[tokio::test]
    async fn provider_error_ends_iteration() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let mut exec = executor(provider);
        assert!(exec.next_step().await.unwrap().is_err());
        assert!(exec.next_step().await.is_none());
    }
}
