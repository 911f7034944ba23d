//! File-backed memory store over JSON lines.
//!
//! Each line is one tenant-tagged record (a memory or a connection). The
//! whole file is loaded on open and rewritten on every mutation, so reads
//! are served from memory and writes are durable.

use async_trait::async_trait;
use iris_core::error::MemoryError;
use iris_core::memory::{Memory, MemoryConnection, MemoryStore, Tenant, VectorMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

use crate::in_memory::{InMemoryStore, TenantData};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record {
    Memory { tenant: Tenant, memory: Memory },
    Connection { tenant: Tenant, connection: MemoryConnection },
}

pub struct FileMemoryStore {
    path: PathBuf,
    inner: InMemoryStore,
}

impl FileMemoryStore {
    /// Open the store at `path`. A missing file starts empty and is created
    /// on the first write; an unreadable or corrupted file is an error, since
    /// the next write would replace it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let path = path.into();
        let tenants = Self::load_from_disk(&path)?;
        debug!(path = %path.display(), tenants = tenants.len(), "File memory store loaded");
        Ok(Self {
            path,
            inner: InMemoryStore::from_tenants(tenants),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<HashMap<Tenant, TenantData>, MemoryError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(MemoryError::Storage(format!(
                    "Failed to read memory file {}: {e}",
                    path.display()
                )));
            }
        };

        let mut tenants: HashMap<Tenant, TenantData> = HashMap::new();
        let lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        for (index, line) in lines {
            let record = serde_json::from_str::<Record>(line).map_err(|e| {
                MemoryError::Storage(format!(
                    "Corrupted memory record at {}:{}: {e}",
                    path.display(),
                    index + 1
                ))
            })?;
            match record {
                Record::Memory { tenant, memory } => {
                    tenants.entry(tenant).or_default().memories.push(memory);
                }
                Record::Connection { tenant, connection } => {
                    tenants
                        .entry(tenant)
                        .or_default()
                        .connections
                        .insert(connection.id, connection);
                }
            }
        }
        Ok(tenants)
    }

    async fn write_to_disk(&self) -> Result<(), MemoryError> {
        let tenants = self.inner.tenants.read().await;

        let mut content = String::new();
        for (tenant, data) in tenants.iter() {
            for memory in &data.memories {
                let record = Record::Memory {
                    tenant: tenant.clone(),
                    memory: memory.clone(),
                };
                push_line(&mut content, &record)?;
            }
            for connection in data.connections.values() {
                let record = Record::Connection {
                    tenant: tenant.clone(),
                    connection: connection.clone(),
                };
                push_line(&mut content, &record)?;
            }
        }
        drop(tenants);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }
}

fn push_line(content: &mut String, record: &Record) -> Result<(), MemoryError> {
    let line = serde_json::to_string(record)
        .map_err(|e| MemoryError::Storage(format!("Failed to serialize memory record: {e}")))?;
    content.push_str(&line);
    content.push('\n');
    Ok(())
}

#[async_trait]
impl MemoryStore for FileMemoryStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save_memory(&self, tenant: &Tenant, memory: Memory) -> Result<(), MemoryError> {
        self.inner.insert_memory(tenant, memory).await;
        self.write_to_disk().await
    }

    async fn save_connection(
        &self,
        tenant: &Tenant,
        connection: MemoryConnection,
    ) -> Result<(), MemoryError> {
        self.inner.insert_connection(tenant, connection).await;
        self.write_to_disk().await
    }

    async fn get_memories_by_ids(
        &self,
        tenant: &Tenant,
        ids: &[Uuid],
    ) -> Result<Vec<Memory>, MemoryError> {
        self.inner.get_memories_by_ids(tenant, ids).await
    }

    async fn get_connections_by_ids(
        &self,
        tenant: &Tenant,
        ids: &[Uuid],
    ) -> Result<Vec<MemoryConnection>, MemoryError> {
        self.inner.get_connections_by_ids(tenant, ids).await
    }

    async fn search_by_vectors(
        &self,
        tenant: &Tenant,
        vectors: &VectorMap,
        limit: usize,
    ) -> Result<Vec<Memory>, MemoryError> {
        self.inner.search_by_vectors(tenant, vectors, limit).await
    }

    async fn count(&self, tenant: &Tenant) -> Result<usize, MemoryError> {
        self.inner.count(tenant).await
    }

    async fn flush(&self) -> Result<(), MemoryError> {
        self.write_to_disk().await
    }
}
