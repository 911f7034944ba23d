//! Model router: maps model ids to the endpoint that serves them.
//!
//! Pipelines ask for a model by id ("gpt-4.1-mini", "nomic-embed-text:latest")
//! and never care which endpoint answers. The router is itself a
//! [`Provider`], so it can be handed anywhere a provider is expected.

use async_trait::async_trait;
use iris_core::error::ProviderError;
use iris_core::provider::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

use crate::openai_compat::OpenAiCompatProvider;

/// Routes requests to the provider registered for the requested model.
#[derive(Default)]
pub struct ModelRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    // BTreeMap keeps `available_models` sorted.
    routes: BTreeMap<String, String>,
}

impl ModelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider and the models it serves.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        models: impl IntoIterator<Item = impl Into<String>>,
    ) {
        let name = name.into();
        for model in models {
            self.routes.insert(model.into(), name.clone());
        }
        self.providers.insert(name, provider);
    }

    /// The provider serving `model`, if any.
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.routes
            .get(model)
            .and_then(|name| self.providers.get(name))
            .cloned()
            .ok_or_else(|| ProviderError::ModelNotFound(model.to_string()))
    }

    pub fn available_models(&self) -> Vec<String> {
        self.routes.keys().cloned().collect()
    }

    pub fn serves(&self, model: &str) -> bool {
        self.routes.contains_key(model)
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Provider for ModelRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.resolve(&request.model)?.complete(request).await
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        self.resolve(&request.model)?.embed(request).await
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.available_models())
    }
}

/// Build the router from the `[llm.providers]` table.
pub fn build_from_config(config: &iris_config::AppConfig) -> Result<ModelRouter, ProviderError> {
    let mut router = ModelRouter::new();

    for (name, provider_config) in &config.llm.providers {
        let api_key = provider_config.api_key.clone().unwrap_or_default();
        let provider = match &provider_config.api_version {
            Some(version) => OpenAiCompatProvider::azure(name, &provider_config.api_url, api_key, version)?,
            None => OpenAiCompatProvider::new(name, &provider_config.api_url, api_key)?,
        };
        info!(
            provider = %name,
            url = %provider_config.api_url,
            azure = provider_config.api_version.is_some(),
            models = provider_config.models.len(),
            "Registered LLM provider"
        );
        router.register(name.clone(), Arc::new(provider), provider_config.models.iter().cloned());
    }

    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;
    use iris_core::message::Message;

    struct NamedProvider(&'static str);

    #[async_trait]
    impl Provider for NamedProvider {
        fn name(&self) -> &str {
            self.0
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(format!("{} answered", self.0)),
                usage: None,
                model: request.model,
            })
        }
    }

    fn request(model: &str) -> ProviderRequest {
        ProviderRequest {
            model: model.into(),
            messages: vec![Message::user("hi")],
            temperature: 0.5,
            max_tokens: None,
            tools: vec![],
            stop: vec![],
        }
    }

    #[tokio::test]
    async fn routes_by_model() {
        let mut router = ModelRouter::new();
        router.register("openai", Arc::new(NamedProvider("openai")), ["gpt-4.1", "gpt-4.1-mini"]);
        router.register("ollama", Arc::new(NamedProvider("ollama")), ["llama3"]);

        let response = router.complete(request("llama3")).await.unwrap();
        assert_eq!(response.message.content, "ollama answered");

        let response = router.complete(request("gpt-4.1")).await.unwrap();
        assert_eq!(response.message.content, "openai answered");
    }

    #[tokio::test]
    async fn unknown_model_is_not_found() {
        let router = ModelRouter::new();
        let err = router.complete(request("gpt-5")).await.unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound(m) if m == "gpt-5"));
    }

    #[tokio::test]
    async fn embed_falls_through_to_default_unsupported() {
        let mut router = ModelRouter::new();
        router.register("openai", Arc::new(NamedProvider("openai")), ["gpt-4.1"]);
        let err = router
            .embed(EmbeddingRequest {
                model: "gpt-4.1".into(),
                inputs: vec!["x".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn build_from_default_config() {
        let config = iris_config::AppConfig::default();
        let router = build_from_config(&config).unwrap();
        assert!(router.serves("gpt-4.1-mini"));
        assert!(router.serves("nomic-embed-text:latest"));
        assert_eq!(router.providers(), vec!["ollama", "openai"]);
    }

    #[test]
    fn azure_resources_are_routed_by_deployment() {
        let mut config = iris_config::AppConfig::default();
        config.llm.providers.insert(
            "azure".into(),
            iris_config::ProviderConfig {
                api_url: "https://tum.openai.azure.com".into(),
                api_key: Some("key".into()),
                api_version: Some("2024-10-21".into()),
                models: vec!["gpt-4o".into()],
            },
        );
        let router = build_from_config(&config).unwrap();
        assert!(router.serves("gpt-4o"));
        assert_eq!(router.providers(), vec!["azure", "ollama", "openai"]);
    }
}
