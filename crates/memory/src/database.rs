//! The process-wide storage handle.
//!
//! [`DatabaseHandle`] opens the memory store and the content index on first
//! use and hands out the same [`VectorDatabase`] afterwards. It is cheap to
//! clone and safe to acquire from concurrent runs.

use iris_config::{MemoryConfig, RetrievalConfig};
use iris_core::error::MemoryError;
use iris_core::memory::MemoryStore;
use iris_core::retrieval::ContentRetriever;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::content::InMemoryContentIndex;
use crate::file_store::FileMemoryStore;
use crate::in_memory::InMemoryStore;

pub struct VectorDatabase {
    pub memories: Arc<dyn MemoryStore>,
    pub content: Arc<dyn ContentRetriever>,
}

impl VectorDatabase {
    pub fn new(memories: Arc<dyn MemoryStore>, content: Arc<dyn ContentRetriever>) -> Self {
        Self { memories, content }
    }

    /// Volatile memory store and an empty content index.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), Arc::new(InMemoryContentIndex::new()))
    }

    pub fn open(memory: &MemoryConfig, retrieval: &RetrievalConfig) -> Result<Self, MemoryError> {
        let memories: Arc<dyn MemoryStore> = match (memory.backend.as_str(), &memory.path) {
            ("file", Some(path)) => Arc::new(FileMemoryStore::open(path)?),
            ("file", None) => {
                return Err(MemoryError::Storage("memory.backend = \"file\" requires memory.path".into()));
            }
            ("memory", _) => Arc::new(InMemoryStore::new()),
            (other, _) => {
                return Err(MemoryError::Storage(format!("Unknown memory backend: {other}")));
            }
        };

        let content: Arc<dyn ContentRetriever> = match &retrieval.content_path {
            Some(path) => Arc::new(InMemoryContentIndex::load(path)?),
            None => Arc::new(InMemoryContentIndex::new()),
        };

        info!(backend = memories.name(), "Vector database opened");
        Ok(Self::new(memories, content))
    }
}

struct HandleInner {
    memory: MemoryConfig,
    retrieval: RetrievalConfig,
    cell: OnceCell<Arc<VectorDatabase>>,
}

#[derive(Clone)]
pub struct DatabaseHandle {
    inner: Arc<HandleInner>,
}

impl DatabaseHandle {
    /// Lazily opens the database described by `memory` and `retrieval`.
    pub fn from_config(memory: &MemoryConfig, retrieval: &RetrievalConfig) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                memory: memory.clone(),
                retrieval: retrieval.clone(),
                cell: OnceCell::new(),
            }),
        }
    }

    /// A handle that is already initialized with `database`.
    pub fn with_database(database: VectorDatabase) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                memory: MemoryConfig::default(),
                retrieval: RetrievalConfig::default(),
                cell: OnceCell::new_with(Some(Arc::new(database))),
            }),
        }
    }

    pub async fn acquire(&self) -> Result<Arc<VectorDatabase>, MemoryError> {
        self.inner
            .cell
            .get_or_try_init(|| async {
                VectorDatabase::open(&self.inner.memory, &self.inner.retrieval).map(Arc::new)
            })
            .await
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.cell.initialized()
    }

    /// Flush the memory store if the database was ever opened.
    pub async fn shutdown(&self) {
        let Some(database) = self.inner.cell.get() else {
            return;
        };
        match database.memories.flush().await {
            Ok(()) => info!("Memory store flushed"),
            Err(e) => warn!(error = %e, "Failed to flush memory store on shutdown"),
        }
    }
}
