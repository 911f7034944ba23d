//! Memory system for Iris.
//!
//! Tenant-scoped long-term memories (extraction, storage, vector search)
//! and the course content index the retrieval tools read from.

pub mod content;
pub mod coordinator;
pub mod creator;
pub mod database;
pub mod file_store;
pub mod in_memory;
pub mod vector;
pub mod vectorizer;

pub use content::InMemoryContentIndex;
pub use coordinator::{MemoryCoordinator, MemoryCreationTask, MemoryLookup};
pub use creator::LlmMemoryCreator;
pub use database::{DatabaseHandle, VectorDatabase};
pub use file_store::FileMemoryStore;
pub use in_memory::InMemoryStore;
pub use vectorizer::ProviderVectorizer;
