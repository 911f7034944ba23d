//! Embeds text once per configured embedding model.

use async_trait::async_trait;
use iris_core::error::MemoryError;
use iris_core::memory::{VectorMap, Vectorizer};
use iris_core::provider::{EmbeddingRequest, Provider};
use std::sync::Arc;
use tracing::debug;

pub struct ProviderVectorizer {
    provider: Arc<dyn Provider>,
    models: Vec<String>,
}

impl ProviderVectorizer {
    pub fn new(provider: Arc<dyn Provider>, models: Vec<String>) -> Self {
        Self { provider, models }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }
}

#[async_trait]
impl Vectorizer for ProviderVectorizer {
    async fn vectorize(&self, text: &str) -> Result<VectorMap, MemoryError> {
        let mut vectors = VectorMap::new();
        for model in &self.models {
            let response = self
                .provider
                .embed(EmbeddingRequest {
                    model: model.clone(),
                    inputs: vec![text.to_string()],
                })
                .await
                .map_err(|e| MemoryError::EmbeddingFailed(format!("{model}: {e}")))?;

            let vector = response.embeddings.into_iter().next().ok_or_else(|| {
                MemoryError::EmbeddingFailed(format!("{model} returned no embedding"))
            })?;
            debug!(model = %model, dims = vector.len(), "Text embedded");
            vectors.insert(model.clone(), vector);
        }
        Ok(vectors)
    }
}
