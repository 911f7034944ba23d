//! Tenant-scoped entry point to memory creation and search.
//!
//! Pipelines hold one [`MemoryCoordinator`] per run. Creation can run on a
//! background task whose result is read exactly once through
//! [`MemoryCreationTask::join`].

use iris_core::error::MemoryError;
use iris_core::memory::{Memory, MemoryCreator, MemoryStore, Tenant, Vectorizer};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

pub const NO_MEMORIES_FOUND: &str = "No memories found for the given query.";
pub const INVALID_MEMORY_ID: &str = "Invalid memory ID provided. Please provide a valid UUID.";

/// Outcome of a memory lookup. `NotFound` carries a message meant for the LLM.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryLookup {
    Found(Vec<Memory>),
    NotFound(String),
}

impl MemoryLookup {
    pub fn memories(&self) -> &[Memory] {
        match self {
            Self::Found(memories) => memories,
            Self::NotFound(_) => &[],
        }
    }
}

#[derive(Clone)]
pub struct MemoryCoordinator {
    tenant: Tenant,
    store: Arc<dyn MemoryStore>,
    vectorizer: Arc<dyn Vectorizer>,
    creator: Arc<dyn MemoryCreator>,
}

impl MemoryCoordinator {
    pub fn new(
        tenant: Tenant,
        store: Arc<dyn MemoryStore>,
        vectorizer: Arc<dyn Vectorizer>,
        creator: Arc<dyn MemoryCreator>,
    ) -> Self {
        Self {
            tenant,
            store,
            vectorizer,
            creator,
        }
    }

    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    pub async fn create_memories(&self, text: &str) -> Result<Vec<Memory>, MemoryError> {
        self.creator.create_memories(&self.tenant, text).await
    }

    /// Start memory creation on its own task. Failures are logged and the
    /// task yields an empty list.
    pub fn create_memories_in_background(&self, text: impl Into<String>) -> MemoryCreationTask {
        let coordinator = self.clone();
        let text = text.into();
        let handle = tokio::spawn(async move {
            match coordinator.create_memories(&text).await {
                Ok(memories) => memories,
                Err(e) => {
                    error!(tenant = %coordinator.tenant, error = %e, "Background memory creation failed");
                    Vec::new()
                }
            }
        });
        debug!(tenant = %self.tenant, "Background memory creation started");
        MemoryCreationTask { handle }
    }

    pub async fn semantic_search(&self, query: &str, limit: usize) -> Result<MemoryLookup, MemoryError> {
        let vectors = self.vectorizer.vectorize(query).await?;
        let memories = self.store.search_by_vectors(&self.tenant, &vectors, limit).await?;
        if memories.is_empty() {
            return Ok(MemoryLookup::NotFound(NO_MEMORIES_FOUND.into()));
        }
        Ok(MemoryLookup::Found(memories))
    }

    /// Memories related to `memory_id`: connected memories by descending
    /// connection weight first, then the nearest neighbours of its vectors.
    pub async fn find_similar_memories(&self, memory_id: &str, limit: usize) -> Result<MemoryLookup, MemoryError> {
        let Ok(id) = Uuid::parse_str(memory_id.trim()) else {
            return Ok(MemoryLookup::NotFound(INVALID_MEMORY_ID.into()));
        };
        let Some(source) = self
            .store
            .get_memories_by_ids(&self.tenant, &[id])
            .await?
            .into_iter()
            .next()
        else {
            return Ok(MemoryLookup::NotFound(format!(
                "Memory with ID {id} not found. Please provide a valid memory ID."
            )));
        };

        let mut memories = Vec::new();
        if !source.connections.is_empty() {
            let mut connections = self
                .store
                .get_connections_by_ids(&self.tenant, &source.connections)
                .await?;
            connections.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

            let mut ids: Vec<Uuid> = Vec::new();
            for connection in &connections {
                for member in &connection.memories {
                    if *member != source.id && !ids.contains(member) {
                        ids.push(*member);
                    }
                }
            }
            ids.truncate(limit);
            memories = self.store.get_memories_by_ids(&self.tenant, &ids).await?;
        }

        if memories.len() < limit {
            let mut exclude: HashSet<Uuid> = memories.iter().map(|m| m.id).collect();
            exclude.insert(source.id);
            let wanted = limit - memories.len();
            let neighbours = self
                .store
                .search_by_vectors(&self.tenant, &source.vectors, wanted + exclude.len())
                .await?;
            memories.extend(
                neighbours
                    .into_iter()
                    .filter(|m| !exclude.contains(&m.id))
                    .take(wanted),
            );
        }

        Ok(MemoryLookup::Found(memories))
    }

    pub async fn has_memories(&self) -> bool {
        match self.store.count(&self.tenant).await {
            Ok(count) => count > 0,
            Err(e) => {
                error!(tenant = %self.tenant, error = %e, "Could not count memories");
                false
            }
        }
    }
}

/// Handle to a background memory creation.
pub struct MemoryCreationTask {
    handle: JoinHandle<Vec<Memory>>,
}

impl MemoryCreationTask {
    /// Wait for the task. A panicked or cancelled task yields no memories.
    pub async fn join(self) -> Vec<Memory> {
        match self.handle.await {
            Ok(memories) => {
                info!(count = memories.len(), "Background memory creation finished");
                memories
            }
            Err(e) => {
                error!(error = %e, "Background memory creation task did not complete");
                Vec::new()
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
