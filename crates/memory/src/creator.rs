//! LLM-backed memory extraction.
//!
//! The text is examined once per focus, concurrently. Every focus yields a
//! JSON array of learnings; learnings are deduplicated, embedded and stored
//! as memories. Memories created together are linked by one `related`
//! connection.

use async_trait::async_trait;
use futures::future::join_all;
use iris_core::error::MemoryError;
use iris_core::memory::{Memory, MemoryConnection, MemoryCreator, MemoryStore, Tenant, Vectorizer};
use iris_core::message::Message;
use iris_core::model::BoundModel;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FOCUS_PERSONAL_DETAILS: &str = "Find personal details about the user. \
Interpret the meaning of the text rather than its words, and focus on the user as a person, \
not on the subject of the conversation.";

const FOCUS_REQUIREMENTS: &str = "Find out which requirements the user has for answers to \
their questions, such as preferred languages, level of detail or style.";

const FOCUS_FACTS: &str = "Find hard facts the user states explicitly about themselves. \
Do not interpret; only extract what is said.";

const FOCUSES: [(&str, &str); 3] = [
    ("personal_details", FOCUS_PERSONAL_DETAILS),
    ("requirements", FOCUS_REQUIREMENTS),
    ("facts", FOCUS_FACTS),
];

const RELATED_CONNECTION_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone, Deserialize)]
struct Learning {
    title: String,
    content: String,
}

pub struct LlmMemoryCreator {
    model: BoundModel,
    vectorizer: Arc<dyn Vectorizer>,
    store: Arc<dyn MemoryStore>,
}

impl LlmMemoryCreator {
    pub fn new(model: BoundModel, vectorizer: Arc<dyn Vectorizer>, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            model,
            vectorizer,
            store,
        }
    }

    fn system_prompt(focus: &str) -> String {
        format!(
            "You extract learnings about a student from a message they wrote.\n\
             {focus}\n\
             Always start the content with 'The user' and never use the user's name.\n\
             Keep every learning short; prefer several short learnings over one long one.\n\
             Answer with a JSON array of objects with the keys \"title\" and \"content\". \
             Answer with [] if there is nothing to learn."
        )
    }

    async fn extract(&self, focus_name: &str, focus: &str, text: &str) -> Result<Vec<Learning>, MemoryError> {
        let messages = vec![Message::system(Self::system_prompt(focus)), Message::user(text)];
        let response = self
            .model
            .invoke(messages, Vec::new())
            .await
            .map_err(|e| MemoryError::ExtractionFailed(format!("{focus_name}: {e}")))?;
        let learnings = parse_learnings(&response.message.content)
            .ok_or_else(|| MemoryError::ExtractionFailed(format!("{focus_name}: no JSON array in answer")))?;
        debug!(focus = focus_name, count = learnings.len(), "Learnings extracted");
        Ok(learnings)
    }
}

/// The first JSON array in `text`, tolerating prose or code fences around it.
fn parse_learnings(text: &str) -> Option<Vec<Learning>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn normalize(content: &str) -> String {
    content
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn deduplicate(learnings: Vec<Learning>) -> Vec<Learning> {
    let mut seen = HashSet::new();
    learnings
        .into_iter()
        .filter(|l| !l.content.trim().is_empty())
        .filter(|l| seen.insert(normalize(&l.content)))
        .collect()
}

#[async_trait]
impl MemoryCreator for LlmMemoryCreator {
    async fn create_memories(&self, tenant: &Tenant, text: &str) -> Result<Vec<Memory>, MemoryError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let results = join_all(
            FOCUSES
                .iter()
                .map(|(name, focus)| self.extract(name, focus, text)),
        )
        .await;

        let mut learnings = Vec::new();
        for result in results {
            match result {
                Ok(found) => learnings.extend(found),
                Err(e) => warn!(tenant = %tenant, error = %e, "Learning extraction failed"),
            }
        }

        let mut memories = Vec::new();
        for learning in deduplicate(learnings) {
            let mut memory = Memory::new(learning.title, learning.content);
            memory.learnings.push(Uuid::new_v4());
            match self.vectorizer.vectorize(&memory.content).await {
                Ok(vectors) => memory.vectors = vectors,
                Err(e) => {
                    warn!(tenant = %tenant, title = %memory.title, error = %e, "Skipping memory that could not be vectorized");
                    continue;
                }
            }
            memories.push(memory);
        }

        let connection = (memories.len() > 1).then(|| MemoryConnection {
            id: Uuid::new_v4(),
            connection_type: "related".into(),
            memories: memories.iter().map(|m| m.id).collect(),
            description: "Learned from the same message".into(),
            weight: RELATED_CONNECTION_WEIGHT,
        });
        if let Some(connection) = &connection {
            for memory in &mut memories {
                memory.connections.push(connection.id);
            }
        }

        for memory in &memories {
            self.store.save_memory(tenant, memory.clone()).await?;
        }
        if let Some(connection) = connection {
            self.store.save_connection(tenant, connection).await?;
        }

        info!(tenant = %tenant, count = memories.len(), "Memories created");
        Ok(memories)
    }
}
