//! Shared collaborators handed to every pipeline.

use iris_config::AppConfig;
use iris_core::memory::{MemoryCreator, Tenant, Vectorizer};
use iris_core::model::{BoundModel, CompletionArguments};
use iris_core::provider::Provider;
use iris_memory::{DatabaseHandle, LlmMemoryCreator, MemoryCoordinator, ProviderVectorizer, VectorDatabase};
use std::sync::Arc;
use tracing::warn;

/// Everything a pipeline needs beyond its request. Built once per process
/// and cloned into every run.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<AppConfig>,
    pub llm: Arc<dyn Provider>,
    pub database: DatabaseHandle,
    vectorizer: Arc<dyn Vectorizer>,
    memory_creator: Option<Arc<dyn MemoryCreator>>,
}

impl PipelineContext {
    pub fn new(config: Arc<AppConfig>, llm: Arc<dyn Provider>, database: DatabaseHandle) -> Self {
        let vectorizer = Arc::new(ProviderVectorizer::new(
            llm.clone(),
            config.memory.embedding_models.clone(),
        ));
        Self {
            config,
            llm,
            database,
            vectorizer,
            memory_creator: None,
        }
    }

    /// Use `creator` instead of the LLM-backed extractor.
    pub fn with_memory_creator(mut self, creator: Arc<dyn MemoryCreator>) -> Self {
        self.memory_creator = Some(creator);
        self
    }

    pub fn with_vectorizer(mut self, vectorizer: Arc<dyn Vectorizer>) -> Self {
        self.vectorizer = vectorizer;
        self
    }

    /// The memory coordinator for `tenant` over `database`.
    pub fn memory_coordinator(&self, tenant: Tenant, database: &VectorDatabase) -> MemoryCoordinator {
        let creator = match &self.memory_creator {
            Some(creator) => creator.clone(),
            None => Arc::new(LlmMemoryCreator::new(
                BoundModel::new(
                    self.llm.clone(),
                    self.config.memory.extraction_model.clone(),
                    CompletionArguments::new(0.0, 2000),
                ),
                self.vectorizer.clone(),
                database.memories.clone(),
            )),
        };
        MemoryCoordinator::new(tenant, database.memories.clone(), self.vectorizer.clone(), creator)
    }

    /// Models served by the configured providers. Empty when listing fails.
    pub async fn available_models(&self) -> Vec<String> {
        match self.llm.list_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(provider = self.llm.name(), error = %e, "Listing models failed");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("llm", &self.llm.name())
            .field("database_initialized", &self.database.is_initialized())
            .field("custom_memory_creator", &self.memory_creator.is_some())
            .finish()
    }
}
