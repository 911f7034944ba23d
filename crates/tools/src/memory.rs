//! Memory search tools. They let the agent look up what it has learned
//! about the student before. Every memory shown to the model is recorded
//! as accessed.

use async_trait::async_trait;
use iris_core::error::ToolError;
use iris_core::memory::MemorySummary;
use iris_core::scratch::{ScratchEntry, ScratchKind, Scratchpad};
use iris_core::tool::{Tool, ToolResult};
use iris_memory::{MemoryCoordinator, MemoryLookup};
use serde_json::{Value, json};
use tracing::warn;

fn render(lookup: MemoryLookup, scratch: &Scratchpad) -> ToolResult {
    match lookup {
        MemoryLookup::Found(memories) => {
            let summaries: Vec<MemorySummary> = memories.iter().map(MemorySummary::from).collect();
            scratch.extend(
                ScratchKind::AccessedMemories,
                memories.into_iter().map(ScratchEntry::Memory),
            );
            ToolResult::text(serde_json::to_string_pretty(&summaries).unwrap_or_default())
        }
        MemoryLookup::NotFound(message) => ToolResult::rejected(message),
    }
}

pub struct MemorySearchTool {
    memory: MemoryCoordinator,
    scratch: Scratchpad,
    limit: usize,
}

impl MemorySearchTool {
    pub fn new(memory: MemoryCoordinator, scratch: Scratchpad, limit: usize) -> Self {
        Self { memory, scratch, limit }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search your memories about the student. Only use it to find new memories, \
         use find_similar_memories to explore around a memory you already have."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "A natural language question or statement"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let Some(query) = arguments["query"].as_str() else {
            return Ok(ToolResult::rejected("Missing 'query' argument."));
        };
        match self.memory.semantic_search(query, self.limit).await {
            Ok(lookup) => Ok(render(lookup, &self.scratch)),
            Err(e) => {
                warn!(tenant = %self.memory.tenant(), error = %e, "Memory search failed");
                Ok(ToolResult::rejected(format!("Memory search failed: {e}")))
            }
        }
    }
}

pub struct SimilarMemoriesTool {
    memory: MemoryCoordinator,
    scratch: Scratchpad,
    limit: usize,
}

impl SimilarMemoriesTool {
    pub fn new(memory: MemoryCoordinator, scratch: Scratchpad, limit: usize) -> Self {
        Self { memory, scratch, limit }
    }
}

#[async_trait]
impl Tool for SimilarMemoriesTool {
    fn name(&self) -> &str {
        "find_similar_memories"
    }

    fn description(&self) -> &str {
        "Find memories similar to a memory you already know. Pass the exact id returned by \
         memory_search; never guess an id."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "memory_id": {
                    "type": "string",
                    "description": "UUID of the memory"
                }
            },
            "required": ["memory_id"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let memory_id = arguments["memory_id"].as_str().unwrap_or_default();
        match self.memory.find_similar_memories(memory_id, self.limit).await {
            Ok(lookup) => Ok(render(lookup, &self.scratch)),
            Err(e) => {
                warn!(tenant = %self.memory.tenant(), error = %e, "Similar memory lookup failed");
                Ok(ToolResult::rejected(format!("Similar memory lookup failed: {e}")))
            }
        }
    }
}
