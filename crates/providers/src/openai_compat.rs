//! Chat completions and embeddings over the OpenAI wire format.
//!
//! Two flavors of endpoint speak it:
//! - OpenAI itself and look-alikes (Ollama, vLLM, LiteLLM proxies) take the
//!   model in the body and a bearer token.
//! - Azure OpenAI serves one deployment per model under
//!   `/openai/deployments/{model}` and wants an `api-key` header plus an
//!   `api-version` query parameter.

use async_trait::async_trait;
use iris_core::error::ProviderError;
use iris_core::message::{Message, MessageToolCall, Role};
use iris_core::provider::{
    EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    OpenAi { base_url: String },
    Azure { base_url: String, api_version: String },
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Chat,
    Embeddings,
}

impl Endpoint {
    fn url(&self, operation: Operation, model: &str) -> String {
        let path = match operation {
            Operation::Chat => "chat/completions",
            Operation::Embeddings => "embeddings",
        };
        match self {
            Self::OpenAi { base_url } => format!("{base_url}/{path}"),
            Self::Azure { base_url, api_version } => {
                format!("{base_url}/openai/deployments/{model}/{path}?api-version={api_version}")
            }
        }
    }

    fn models_url(&self) -> String {
        match self {
            Self::OpenAi { base_url } => format!("{base_url}/models"),
            Self::Azure { base_url, api_version } => format!("{base_url}/openai/models?api-version={api_version}"),
        }
    }

    fn base_url(&self) -> &str {
        match self {
            Self::OpenAi { base_url } | Self::Azure { base_url, .. } => base_url,
        }
    }
}

pub struct OpenAiCompatProvider {
    name: String,
    endpoint: Endpoint,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// An OpenAI-style endpoint. An empty `api_key` sends no credentials,
    /// which is what a local Ollama expects.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let base_url = trim_base(base_url.into());
        Self::with_endpoint(name, Endpoint::OpenAi { base_url }, api_key)
    }

    /// An Azure OpenAI resource; models are deployment names.
    pub fn azure(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let endpoint = Endpoint::Azure {
            base_url: trim_base(base_url.into()),
            api_version: api_version.into(),
        };
        Self::with_endpoint(name, endpoint, api_key)
    }

    fn with_endpoint(name: impl Into<String>, endpoint: Endpoint, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            name: name.into(),
            endpoint,
            api_key: api_key.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            return builder;
        }
        match self.endpoint {
            Endpoint::OpenAi { .. } => builder.bearer_auth(&self.api_key),
            Endpoint::Azure { .. } => builder.header("api-key", &self.api_key),
        }
    }

    /// Send `builder`, map non-2xx answers and decode the body as `T`.
    async fn call<T: DeserializeOwned>(&self, builder: RequestBuilder, model: &str) -> Result<T, ProviderError> {
        let response = self.authorize(builder).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, %status, model, "Endpoint refused the request");
            return Err(classify(status, retry_after, model, &body));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {e}", self.name)))
    }
}

fn trim_base(base_url: String) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// The error a non-2xx answer stands for.
fn classify(status: StatusCode, retry_after: Option<u64>, model: &str, body: &str) -> ProviderError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after_secs: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthenticationFailed(message),
        StatusCode::NOT_FOUND => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError {
            status_code: status.as_u16(),
            message,
        },
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, tools = request.tools.len(), "Chat completion");
        let url = self.endpoint.url(Operation::Chat, &request.model);
        let body = ChatBody::from(&request);
        let completion: Completion = self.call(self.client.post(url).json(&body), &request.model).await?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("{} returned no choices", self.name)))?;
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| MessageToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ProviderResponse {
            message: Message {
                tool_calls,
                ..Message::assistant(choice.message.content.unwrap_or_default())
            },
            usage: completion.usage.map(Usage::from),
            model: completion.model,
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        debug!(provider = %self.name, model = %request.model, inputs = request.inputs.len(), "Embedding");
        let url = self.endpoint.url(Operation::Embeddings, &request.model);
        let body = EmbeddingBody {
            model: &request.model,
            input: &request.inputs,
            encoding_format: "float",
        };
        let mut result: Embeddings = self.call(self.client.post(url).json(&body), &request.model).await?;

        // Some servers answer out of order; `index` is authoritative.
        result.data.sort_by_key(|item| item.index);
        Ok(EmbeddingResponse {
            embeddings: result.data.into_iter().map(|item| item.embedding).collect(),
            model: result.model,
            usage: result.usage.map(Usage::from),
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let list: ModelList = self.call(self.client.get(self.endpoint.models_url()), "").await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

// Request bodies borrow from the request; nothing is cloned on the way out.

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

impl<'a> From<&'a ProviderRequest> for ChatBody<'a> {
    fn from(request: &'a ProviderRequest) -> Self {
        Self {
            model: &request.model,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request.tools.iter().map(WireTool::from).collect(),
            stop: (!request.stop.is_empty()).then_some(request.stop.as_slice()),
        }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    /// Omitted on assistant turns that only call tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a Message> for WireMessage<'a> {
    fn from(message: &'a Message) -> Self {
        let tool_only = message.requests_tools() && message.content.is_empty();
        Self {
            role: message.role,
            content: (!tool_only).then_some(message.content.as_str()),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: &call.id,
                    kind: "function",
                    function: WireFunctionCall {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall<'a>,
}

#[derive(Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

impl<'a> From<&'a ToolDefinition> for WireTool<'a> {
    fn from(definition: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: definition,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingBody<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct Completion {
    model: String,
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Reply,
}

#[derive(Deserialize)]
struct Reply {
    content: Option<String>,
    tool_calls: Option<Vec<ReplyToolCall>>,
}

#[derive(Deserialize)]
struct ReplyToolCall {
    id: String,
    function: ReplyFunction,
}

#[derive(Deserialize)]
struct ReplyFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct Embeddings {
    data: Vec<EmbeddingItem>,
    model: String,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn request(messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest {
            model: "gpt-4.1-mini".into(),
            messages,
            temperature: 0.2,
            max_tokens: None,
            tools: Vec::new(),
            stop: Vec::new(),
        }
    }

    fn wire(request: &ProviderRequest) -> Value {
        serde_json::to_value(ChatBody::from(request)).unwrap()
    }

    #[test]
    fn openai_urls() {
        let provider = OpenAiCompatProvider::new("ollama", "http://localhost:11434/v1/", "").unwrap();
        assert_eq!(provider.base_url(), "http://localhost:11434/v1");
        assert_eq!(
            provider.endpoint().url(Operation::Chat, "llama3"),
            "http://localhost:11434/v1/chat/completions"
        );
        assert_eq!(provider.endpoint().models_url(), "http://localhost:11434/v1/models");
    }

    #[test]
    fn azure_urls_name_the_deployment() {
        let provider =
            OpenAiCompatProvider::azure("azure", "https://tum.openai.azure.com/", "key", "2024-10-21").unwrap();
        assert_eq!(
            provider.endpoint().url(Operation::Embeddings, "text-embedding-3-small"),
            "https://tum.openai.azure.com/openai/deployments/text-embedding-3-small/embeddings?api-version=2024-10-21"
        );
    }

    #[test]
    fn plain_request_omits_optional_fields() {
        let body = wire(&request(vec![Message::system("You are Iris"), Message::user("Hello")]));
        assert_eq!(body["messages"][0], json!({"role": "system", "content": "You are Iris"}));
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("tools").is_none());
        assert!(body.get("stop").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn tool_round_trip_messages() {
        let mut req = request(vec![
            Message::assistant_tool_calls(vec![MessageToolCall {
                id: "call_1".into(),
                name: "file_lookup".into(),
                arguments: r#"{"file_path":"src/Main.java"}"#.into(),
            }]),
            Message::tool_result("call_1", "public class Main {}"),
        ]);
        req.tools.push(ToolDefinition {
            name: "file_lookup".into(),
            description: "Read a repository file".into(),
            parameters: json!({"type": "object"}),
        });
        let body = wire(&req);

        let asked = &body["messages"][0];
        assert!(asked.get("content").is_none());
        assert_eq!(asked["tool_calls"][0]["type"], "function");
        assert_eq!(asked["tool_calls"][0]["function"]["name"], "file_lookup");
        assert_eq!(body["messages"][1]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "file_lookup");
    }

    #[test]
    fn completion_with_null_fields_parses() {
        let data = r#"{
            "model": "gpt-4.1-mini-2025-04-14",
            "choices": [{"message": {"role": "assistant", "content": null,
                "tool_calls": [{"id": "call_9", "type": "function",
                    "function": {"name": "get_submission_details", "arguments": "{}"}}]}}],
            "usage": {"prompt_tokens": 50, "completion_tokens": 7, "total_tokens": 57}
        }"#;
        let parsed: Completion = serde_json::from_str(data).unwrap();
        let reply = &parsed.choices[0].message;
        assert!(reply.content.is_none());
        assert_eq!(reply.tool_calls.as_ref().unwrap()[0].function.name, "get_submission_details");

        let plain: Completion = serde_json::from_str(
            r#"{"model": "llama3", "choices": [{"message": {"content": "Hi", "tool_calls": null}}], "usage": null}"#,
        )
        .unwrap();
        assert!(plain.choices[0].message.tool_calls.is_none());
    }

    #[test]
    fn embeddings_follow_their_index() {
        let data = r#"{
            "data": [
                {"embedding": [0.4, 0.5], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ],
            "model": "nomic-embed-text:latest",
            "usage": {"prompt_tokens": 8, "total_tokens": 8}
        }"#;
        let mut parsed: Embeddings = serde_json::from_str(data).unwrap();
        parsed.data.sort_by_key(|item| item.index);
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
        assert_eq!(Usage::from(parsed.usage.unwrap()).completion_tokens, 0);
    }

    #[test]
    fn status_codes_map_to_errors() {
        let envelope = r#"{"error": {"message": "Incorrect API key provided"}}"#;
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, None, "gpt-4.1", envelope),
            ProviderError::AuthenticationFailed(m) if m == "Incorrect API key provided"
        ));
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, Some(20), "gpt-4.1", ""),
            ProviderError::RateLimited { retry_after_secs: 20 }
        ));
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, None, "gpt-4.1", ""),
            ProviderError::RateLimited { retry_after_secs: DEFAULT_RETRY_AFTER_SECS }
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, None, "gpt-5", "no such deployment"),
            ProviderError::ModelNotFound(m) if m == "gpt-5"
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, None, "gpt-4.1", "upstream down"),
            ProviderError::ApiError { status_code: 502, message } if message == "upstream down"
        ));
    }
}
