//! In-memory index of lecture chunks and FAQs per course.
//!
//! Content is loaded once from a JSON file of the form
//! `{"lectures": [chunk, ...], "faqs": [chunk, ...]}` where every chunk
//! carries its `course_id`. Ranking is plain keyword overlap.

use async_trait::async_trait;
use iris_core::error::MemoryError;
use iris_core::retrieval::{ContentKind, ContentRetriever, RetrievedChunk};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
struct ContentFile {
    #[serde(default)]
    lectures: Vec<ChunkRecord>,
    #[serde(default)]
    faqs: Vec<ChunkRecord>,
}

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    course_id: i64,
    title: String,
    content: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    page: Option<u32>,
}

impl ChunkRecord {
    fn into_chunk(self, kind: ContentKind) -> RetrievedChunk {
        RetrievedChunk {
            course_id: self.course_id,
            kind,
            title: self.title,
            content: self.content,
            link: self.link,
            page: self.page,
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContentIndex {
    chunks: RwLock<Vec<RetrievedChunk>>,
}

impl InMemoryContentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, MemoryError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MemoryError::Storage(format!("Failed to read {}: {e}", path.display()))
        })?;
        let file: ContentFile = serde_json::from_str(&raw).map_err(|e| {
            MemoryError::Storage(format!("Failed to parse {}: {e}", path.display()))
        })?;

        let chunks: Vec<RetrievedChunk> = file
            .lectures
            .into_iter()
            .map(|c| c.into_chunk(ContentKind::Lecture))
            .chain(file.faqs.into_iter().map(|c| c.into_chunk(ContentKind::Faq)))
            .collect();
        info!(path = %path.display(), chunks = chunks.len(), "Course content loaded");

        Ok(Self {
            chunks: RwLock::new(chunks),
        })
    }

    pub async fn insert(&self, chunk: RetrievedChunk) {
        self.chunks.write().await.push(chunk);
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

/// Occurrences of query terms in the chunk, title hits counted twice.
fn score(chunk: &RetrievedChunk, query: &HashSet<String>) -> usize {
    let title = terms(&chunk.title);
    let body = chunk.content.to_lowercase();
    query
        .iter()
        .map(|t| body.matches(t.as_str()).count() + 2 * usize::from(title.contains(t)))
        .sum()
}

#[async_trait]
impl ContentRetriever for InMemoryContentIndex {
    async fn has_content(&self, course_id: i64, kind: ContentKind) -> Result<bool, MemoryError> {
        Ok(self
            .chunks
            .read()
            .await
            .iter()
            .any(|c| c.course_id == course_id && c.kind == kind))
    }

    async fn retrieve(
        &self,
        course_id: i64,
        kind: ContentKind,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, MemoryError> {
        let query = terms(query);
        let chunks = self.chunks.read().await;

        let mut scored: Vec<(usize, &RetrievedChunk)> = chunks
            .iter()
            .filter(|c| c.course_id == course_id && c.kind == kind)
            .map(|c| (score(c, &query), c))
            .filter(|(s, _)| *s > 0)
            .collect();
        // Stable sort keeps file order among ties.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, c)| c.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(course_id: i64, kind: ContentKind, title: &str, content: &str) -> RetrievedChunk {
        RetrievedChunk {
            course_id,
            kind,
            title: title.into(),
            content: content.into(),
            link: None,
            page: None,
        }
    }

    #[tokio::test]
    async fn retrieval_is_scoped_by_course_and_kind() {
        let index = InMemoryContentIndex::new();
        index
            .insert(chunk(1, ContentKind::Lecture, "Recursion", "Recursion calls itself."))
            .await;
        index
            .insert(chunk(1, ContentKind::Faq, "Exam", "The exam covers recursion."))
            .await;
        index
            .insert(chunk(2, ContentKind::Lecture, "Recursion", "Other course recursion."))
            .await;

        assert!(index.has_content(1, ContentKind::Faq).await.unwrap());
        assert!(!index.has_content(2, ContentKind::Faq).await.unwrap());

        let lectures = index
            .retrieve(1, ContentKind::Lecture, "explain recursion", 5)
            .await
            .unwrap();
        assert_eq!(lectures.len(), 1);
        assert_eq!(lectures[0].content, "Recursion calls itself.");
    }

    #[tokio::test]
    async fn ranks_by_keyword_overlap() {
        let index = InMemoryContentIndex::new();
        index
            .insert(chunk(1, ContentKind::Lecture, "Loops", "A loop repeats. Sorting uses loops."))
            .await;
        index
            .insert(chunk(1, ContentKind::Lecture, "Sorting", "Sorting orders elements."))
            .await;
        index
            .insert(chunk(1, ContentKind::Lecture, "Graphs", "Nodes and edges."))
            .await;

        let hits = index
            .retrieve(1, ContentKind::Lecture, "sorting", 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Sorting");
    }

    #[test]
    fn load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        std::fs::write(
            &path,
            r#"{
                "lectures": [{"course_id": 3, "title": "Intro", "content": "Welcome", "link": "/courses/3/lectures/1", "page": 2}],
                "faqs": [{"course_id": 3, "title": "Late submissions", "content": "Not accepted."}]
            }"#,
        )
        .unwrap();

        let index = InMemoryContentIndex::load(&path).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        assert_eq!(rt.block_on(index.len()), 2);
        assert!(rt.block_on(index.has_content(3, ContentKind::Faq)).unwrap());
    }

    #[test]
    fn load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("content.json");
        std::fs::write(&path, "[").unwrap();
        assert!(InMemoryContentIndex::load(&path).is_err());
    }
}
