//! In-memory store, tenant-partitioned and non-persistent.
//!
//! Useful for development and tests. The file store wraps this one and adds
//! persistence.

use async_trait::async_trait;
use iris_core::error::MemoryError;
use iris_core::memory::{Memory, MemoryConnection, MemoryStore, Tenant, VectorMap};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::vector::rank_memories;

#[derive(Debug, Clone, Default)]
pub(crate) struct TenantData {
    pub(crate) memories: Vec<Memory>,
    pub(crate) connections: HashMap<Uuid, MemoryConnection>,
}

impl TenantData {
    fn upsert_memory(&mut self, memory: Memory) {
        match self.memories.iter_mut().find(|m| m.id == memory.id) {
            Some(existing) => *existing = memory,
            None => self.memories.push(memory),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    pub(crate) tenants: RwLock<HashMap<Tenant, TenantData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_tenants(tenants: HashMap<Tenant, TenantData>) -> Self {
        Self {
            tenants: RwLock::new(tenants),
        }
    }

    pub(crate) async fn insert_memory(&self, tenant: &Tenant, memory: Memory) {
        self.tenants
            .write()
            .await
            .entry(tenant.clone())
            .or_default()
            .upsert_memory(memory);
    }

    pub(crate) async fn insert_connection(&self, tenant: &Tenant, connection: MemoryConnection) {
        self.tenants
            .write()
            .await
            .entry(tenant.clone())
            .or_default()
            .connections
            .insert(connection.id, connection);
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save_memory(&self, tenant: &Tenant, memory: Memory) -> Result<(), MemoryError> {
        self.insert_memory(tenant, memory).await;
        Ok(())
    }

    async fn save_connection(
        &self,
        tenant: &Tenant,
        connection: MemoryConnection,
    ) -> Result<(), MemoryError> {
        self.insert_connection(tenant, connection).await;
        Ok(())
    }

    async fn get_memories_by_ids(
        &self,
        tenant: &Tenant,
        ids: &[Uuid],
    ) -> Result<Vec<Memory>, MemoryError> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| data.memories.iter().find(|m| m.id == *id).cloned())
            .collect())
    }

    async fn get_connections_by_ids(
        &self,
        tenant: &Tenant,
        ids: &[Uuid],
    ) -> Result<Vec<MemoryConnection>, MemoryError> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| data.connections.get(id).cloned())
            .collect())
    }

    async fn search_by_vectors(
        &self,
        tenant: &Tenant,
        vectors: &VectorMap,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|data| rank_memories(&data.memories, vectors, limit))
            .unwrap_or_default())
    }

    async fn count(&self, tenant: &Tenant) -> Result<usize, MemoryError> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|d| d.memories.iter().filter(|m| !m.deleted).count())
            .unwrap_or(0))
    }
}
