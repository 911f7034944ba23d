//! Selectable model configurations of a pipeline.

use serde::{Deserialize, Serialize};

pub trait AgentVariant: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// Model that drives the agent loop.
    fn agent_model(&self) -> &str;

    /// Every model the variant calls. A variant is only offered when all of
    /// them are served.
    fn required_models(&self) -> Vec<String> {
        vec![self.agent_model().to_string()]
    }

    fn info(&self) -> VariantInfo {
        VariantInfo {
            id: self.id().to_string(),
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}

/// The public description of a variant, as listed by the variants endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// Variants whose required models are all in `available_models`.
pub fn available_variants<V: AgentVariant>(variants: &[V], available_models: &[String]) -> Vec<V> {
    variants
        .iter()
        .filter(|v| {
            v.required_models()
                .iter()
                .all(|m| available_models.contains(m))
        })
        .cloned()
        .collect()
}
