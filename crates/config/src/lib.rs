//! Iris configuration: one TOML file, a few environment overrides, and
//! validation before anything starts.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Everything `iris serve` needs; each section defaults on its own.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Keys Artemis must present in the `Authorization` header.
    /// An empty list disables the check.
    #[serde(default)]
    pub api_keys: Vec<String>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub status: StatusConfig,

    #[serde(default)]
    pub assessment: AssessmentConfig,
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_keys", &format!("[{} REDACTED]", self.api_keys.len()))
            .field("gateway", &self.gateway)
            .field("llm", &self.llm)
            .field("pipeline", &self.pipeline)
            .field("memory", &self.memory)
            .field("retrieval", &self.retrieval)
            .field("status", &self.status)
            .field("assessment", &self.assessment)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            body_limit: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider that receives `IRIS_LLM_API_KEY` when it has no key of its own.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// OpenAI-compatible endpoints and the models each one serves.
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut providers = HashMap::new();
    providers.insert(
        "openai".into(),
        ProviderConfig {
            api_url: "https://api.openai.com/v1".into(),
            api_key: None,
            api_version: None,
            models: vec!["gpt-4.1".into(), "gpt-4.1-mini".into()],
        },
    );
    providers.insert(
        "ollama".into(),
        ProviderConfig {
            api_url: "http://localhost:11434/v1".into(),
            api_key: None,
            api_version: None,
            models: default_embedding_models(),
        },
    );
    providers
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            providers: default_providers(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Marks an Azure OpenAI resource. Each model is then a deployment
    /// name and requests carry this `api-version`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Chat and embedding models routed to this endpoint.
    #[serde(default)]
    pub models: Vec<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("api_version", &self.api_version)
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// How many prior chat messages reach the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on agent steps (model calls) per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_refinement_model")]
    pub refinement_model: String,
}

fn default_history_window() -> usize {
    15
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_max_iterations() -> usize {
    10
}
fn default_refinement_model() -> String {
    "gpt-4.1-mini".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_iterations: default_max_iterations(),
            refinement_model: default_refinement_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Global switch; users still have to opt in individually.
    #[serde(default = "default_true")]
    pub creation_enabled: bool,

    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    /// Every memory is embedded once per model listed here.
    #[serde(default = "default_embedding_models")]
    pub embedding_models: Vec<String>,

    /// "memory" or "file"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// JSON-lines file for the "file" backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}
fn default_search_limit() -> usize {
    5
}
fn default_extraction_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_embedding_models() -> Vec<String> {
    vec![
        "mxbai-embed-large:latest".into(),
        "nomic-embed-text:latest".into(),
    ]
}
fn default_memory_backend() -> String {
    "memory".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            creation_enabled: true,
            search_limit: default_search_limit(),
            extraction_model: default_extraction_model(),
            embedding_models: default_embedding_models(),
            backend: default_memory_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// JSON file with lecture units and FAQs per course.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default = "default_status_timeout")]
    pub timeout_secs: u64,
}

fn default_status_timeout() -> u64 {
    200
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_status_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    /// Verdicts the assessment model may return.
    #[serde(default = "default_verdicts")]
    pub verdicts: Vec<String>,

    /// Used when the model answers with something outside `verdicts`.
    #[serde(default = "default_follow_up_verdict")]
    pub fallback_verdict: String,

    /// The verdict that asks the agent for another question.
    #[serde(default = "default_follow_up_verdict")]
    pub follow_up_verdict: String,

    #[serde(default = "default_min_questions")]
    pub min_questions: u32,

    #[serde(default = "default_max_questions")]
    pub max_questions: u32,
}

fn default_verdicts() -> Vec<String> {
    ["suspicious", "unsuspicious", "follow_up_question", "clarify"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_follow_up_verdict() -> String {
    "follow_up_question".into()
}
fn default_min_questions() -> u32 {
    2
}
fn default_max_questions() -> u32 {
    5
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            verdicts: default_verdicts(),
            fallback_verdict: default_follow_up_verdict(),
            follow_up_verdict: default_follow_up_verdict(),
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
        }
    }
}

impl AppConfig {
    /// Load the file at [`AppConfig::config_path`], then apply the
    /// environment:
    /// - `IRIS_LLM_API_KEY` or `OPENAI_API_KEY` for a default provider without a key
    /// - `IRIS_API_KEYS`, comma separated, replaces `api_keys`
    /// - `IRIS_PORT` replaces `gateway.port`
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate one file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let default_provider = self.llm.default_provider.clone();
        if let Some(provider) = self.llm.providers.get_mut(&default_provider) {
            if provider.api_key.is_none() {
                provider.api_key = var("IRIS_LLM_API_KEY").or_else(|| var("OPENAI_API_KEY"));
            }
        }

        if let Some(keys) = var("IRIS_API_KEYS") {
            self.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(port) = var("IRIS_PORT") {
            self.gateway.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("IRIS_PORT '{port}' is not a port number")))?;
        }
        Ok(())
    }

    /// `$IRIS_CONFIG`, or `config.toml` under [`AppConfig::config_dir`].
    pub fn config_path() -> PathBuf {
        std::env::var_os("IRIS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("config.toml"))
    }

    /// `~/.iris`; relative to the working directory when `HOME` is unset,
    /// as in some containers.
    pub fn config_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_default()
            .join(".iris")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));
        let pipeline = &self.pipeline;

        if !(0.0..=2.0).contains(&pipeline.temperature) {
            return invalid("pipeline.temperature must lie in 0.0..=2.0");
        }
        if pipeline.history_window == 0 || pipeline.max_iterations == 0 {
            return invalid("pipeline.history_window and pipeline.max_iterations must be positive");
        }
        if self.status.timeout_secs == 0 {
            return invalid("status.timeout_secs must be positive");
        }

        match (self.memory.backend.as_str(), &self.memory.path) {
            ("memory", _) | ("file", Some(_)) => {}
            ("file", None) => return invalid("memory.backend = \"file\" needs memory.path"),
            (other, _) => {
                return Err(ConfigError::Invalid(format!(
                    "memory.backend '{other}' is neither 'memory' nor 'file'"
                )));
            }
        }

        let assessment = &self.assessment;
        for verdict in [&assessment.fallback_verdict, &assessment.follow_up_verdict] {
            if !assessment.verdicts.contains(verdict) {
                return Err(ConfigError::Invalid(format!(
                    "verdict '{verdict}' is missing from assessment.verdicts"
                )));
            }
        }
        if assessment.min_questions > assessment.max_questions {
            return invalid("assessment.min_questions exceeds assessment.max_questions");
        }

        Ok(())
    }

    /// Every model some provider is configured to serve.
    pub fn configured_models(&self) -> Vec<String> {
        let mut models: Vec<String> = self
            .llm
            .providers
            .values()
            .flat_map(|p| p.models.iter().cloned())
            .collect();
        models.sort();
        models.dedup();
        models
    }

    /// The built-in defaults as TOML, for `iris config show --defaults`.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid configuration: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
