//! Long-term memory model and the traits behind it.
//!
//! Memories are partitioned by [`Tenant`]. Each memory carries one vector
//! per embedding model, so a store can compare a query against every model
//! the memory was embedded with.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::MemoryError;

/// Vectors keyed by embedding model name.
pub type VectorMap = HashMap<String, Vec<f32>>;

/// The isolation scope of a memory store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenant(String);

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// `artemis-user-{id}`
    pub fn for_user(user_id: i64) -> Self {
        Self(format!("artemis-user-{user_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    /// Learnings this memory was condensed from.
    #[serde(default)]
    pub learnings: Vec<Uuid>,
    /// Ids of [`MemoryConnection`]s this memory takes part in.
    #[serde(default)]
    pub connections: Vec<Uuid>,
    #[serde(default)]
    pub vectors: VectorMap,
    #[serde(default)]
    pub slept_on: bool,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            content: content.into(),
            learnings: Vec::new(),
            connections: Vec::new(),
            vectors: VectorMap::new(),
            slept_on: false,
            deleted: false,
            created_at: Utc::now(),
        }
    }
}

/// A weighted relation between memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConnection {
    pub id: Uuid,
    pub connection_type: String,
    pub memories: Vec<Uuid>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

/// The shape of a memory in status updates (no vectors).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySummary {
    pub id: String,
    pub title: String,
    pub content: String,
    pub slept_on: bool,
    pub deleted: bool,
    pub learnings: Vec<String>,
    pub connections: Vec<String>,
}

impl From<&Memory> for MemorySummary {
    fn from(memory: &Memory) -> Self {
        Self {
            id: memory.id.to_string(),
            title: memory.title.clone(),
            content: memory.content.clone(),
            slept_on: memory.slept_on,
            deleted: memory.deleted,
            learnings: memory.learnings.iter().map(Uuid::to_string).collect(),
            connections: memory.connections.iter().map(Uuid::to_string).collect(),
        }
    }
}

/// Tenant-scoped persistence and vector search for memories.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    fn name(&self) -> &str;

    async fn save_memory(&self, tenant: &Tenant, memory: Memory) -> Result<(), MemoryError>;

    async fn save_connection(
        &self,
        tenant: &Tenant,
        connection: MemoryConnection,
    ) -> Result<(), MemoryError>;

    /// Memories with the given ids, in the order requested. Unknown ids are skipped.
    async fn get_memories_by_ids(
        &self,
        tenant: &Tenant,
        ids: &[Uuid],
    ) -> Result<Vec<Memory>, MemoryError>;

    async fn get_connections_by_ids(
        &self,
        tenant: &Tenant,
        ids: &[Uuid],
    ) -> Result<Vec<MemoryConnection>, MemoryError>;

    /// Closest non-deleted memories to `vectors`, best first.
    async fn search_by_vectors(
        &self,
        tenant: &Tenant,
        vectors: &VectorMap,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError>;

    async fn count(&self, tenant: &Tenant) -> Result<usize, MemoryError>;

    /// Persist pending writes. No-op for volatile stores.
    async fn flush(&self) -> Result<(), MemoryError> {
        Ok(())
    }
}

/// Embeds text with every configured embedding model.
#[async_trait]
pub trait Vectorizer: Send + Sync {
    async fn vectorize(&self, text: &str) -> Result<VectorMap, MemoryError>;
}

/// Extracts and stores new memories from a piece of user text.
#[async_trait]
pub trait MemoryCreator: Send + Sync {
    async fn create_memories(&self, tenant: &Tenant, text: &str) -> Result<Vec<Memory>, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_for_user() {
        assert_eq!(Tenant::for_user(42).as_str(), "artemis-user-42");
    }

    #[test]
    fn summary_drops_vectors() {
        let mut memory = Memory::new("Prefers Java", "The user prefers examples in Java.");
        memory.vectors.insert("nomic-embed-text:latest".into(), vec![0.1, 0.2]);
        let summary = MemorySummary::from(&memory);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["title"], "Prefers Java");
        assert!(json.get("vectors").is_none());
        assert_eq!(json["sleptOn"], false);
    }
}
