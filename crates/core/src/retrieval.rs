//! Course content retrieval (lecture units and FAQs).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Lecture,
    Faq,
}

/// A retrieved piece of course content, with enough metadata to cite it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub course_id: i64,
    pub kind: ContentKind,
    pub title: String,
    pub content: String,
    /// Link path relative to the Artemis base URL.
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
}

#[async_trait]
pub trait ContentRetriever: Send + Sync {
    /// Whether the course has any content of `kind`.
    async fn has_content(&self, course_id: i64, kind: ContentKind) -> Result<bool, MemoryError>;

    async fn retrieve(
        &self,
        course_id: i64,
        kind: ContentKind,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, MemoryError>;
}
