//! Lecture and FAQ retrieval for the current course.
//!
//! Every chunk handed to the model is also recorded in the run's scratchpad
//! so the citation step can reference it afterwards.

use async_trait::async_trait;
use iris_core::error::ToolError;
use iris_core::retrieval::{ContentKind, ContentRetriever, RetrievedChunk};
use iris_core::scratch::{ScratchEntry, ScratchKind, Scratchpad};
use iris_core::tool::{Tool, ToolResult};
use iris_status::StatusCallback;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::warn;

pub struct ContentRetrievalTool {
    kind: ContentKind,
    course_id: i64,
    retriever: Arc<dyn ContentRetriever>,
    scratch: Scratchpad,
    callback: StatusCallback,
    limit: usize,
}

impl ContentRetrievalTool {
    pub fn lectures(
        course_id: i64,
        retriever: Arc<dyn ContentRetriever>,
        scratch: Scratchpad,
        callback: StatusCallback,
    ) -> Self {
        Self {
            kind: ContentKind::Lecture,
            course_id,
            retriever,
            scratch,
            callback,
            limit: 5,
        }
    }

    pub fn faqs(
        course_id: i64,
        retriever: Arc<dyn ContentRetriever>,
        scratch: Scratchpad,
        callback: StatusCallback,
    ) -> Self {
        Self {
            kind: ContentKind::Faq,
            limit: 10,
            ..Self::lectures(course_id, retriever, scratch, callback)
        }
    }

    fn slot(&self) -> ScratchKind {
        match self.kind {
            ContentKind::Lecture => ScratchKind::LectureContent,
            ContentKind::Faq => ScratchKind::Faqs,
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            ContentKind::Lecture => "lecture content",
            ContentKind::Faq => "FAQs",
        }
    }
}

fn format_chunk(chunk: &RetrievedChunk) -> String {
    let mut out = format!("Title: {}\nContent: {}", chunk.title, chunk.content);
    if let Some(page) = chunk.page {
        out.push_str(&format!("\nPage: {page}"));
    }
    if let Some(link) = &chunk.link {
        out.push_str(&format!("\nLink: {link}"));
    }
    out
}

#[async_trait]
impl Tool for ContentRetrievalTool {
    fn name(&self) -> &str {
        match self.kind {
            ContentKind::Lecture => "lecture_content_retrieval",
            ContentKind::Faq => "faq_content_retrieval",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            ContentKind::Lecture => {
                "Search the lecture slides and transcriptions of this course. Use it for conceptual \
                 questions the lecture covers."
            }
            ContentKind::Faq => {
                "Search the course FAQs. Use it for organisational questions such as deadlines, \
                 grading or exam rules."
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What to look for, phrased as a question or keywords"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let Some(prompt) = arguments["prompt"].as_str() else {
            return Ok(ToolResult::rejected("Missing 'prompt' argument."));
        };
        self.callback
            .progress_hint(&format!("Retrieving {} ...", self.label()))
            .await;

        let chunks = match self
            .retriever
            .retrieve(self.course_id, self.kind, prompt, self.limit)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(tool = self.name(), error = %e, "Content retrieval failed");
                return Ok(ToolResult::rejected(format!("Retrieving {} failed: {e}", self.label())));
            }
        };
        if chunks.is_empty() {
            return Ok(ToolResult::text(format!("No relevant {} found.", self.label())));
        }

        let output = chunks.iter().map(format_chunk).collect::<Vec<_>>().join("\n\n");
        self.scratch
            .extend(self.slot(), chunks.into_iter().map(ScratchEntry::Chunk));
        Ok(ToolResult::text(output))
    }
}
