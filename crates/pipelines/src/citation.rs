//! Citations for answers that used lecture content or FAQs.
//!
//! Sources are numbered from 1. The model inserts `[cite:N]` markers and a
//! sources list is appended for the markers that refer to a real source.
//! Markers pointing nowhere are removed.

use iris_core::error::ProviderError;
use iris_core::message::Message;
use iris_core::model::{BoundModel, CompletionArguments};
use iris_core::provider::Provider;
use iris_core::retrieval::{ContentKind, RetrievedChunk};
use iris_core::token::PipelineKind;
use regex_lite::{Captures, Regex};
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::Generated;
use crate::prompts;

/// The model's reply when no source was used.
pub const NO_CITATIONS: &str = "!NONE!";

static CITE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[cite:\s*(\d+)\]").expect("citation marker pattern is valid"));

pub struct CitationPipeline {
    llm: Arc<dyn Provider>,
}

impl CitationPipeline {
    pub fn new(llm: Arc<dyn Provider>) -> Self {
        Self { llm }
    }

    /// Add citations for `sources` to `answer` using `model`. Links are
    /// resolved against `base_url`.
    pub async fn cite(
        &self,
        model: &str,
        sources: &[RetrievedChunk],
        answer: &str,
        base_url: &str,
    ) -> Result<Generated<String>, ProviderError> {
        let sources = dedup_sources(sources);
        if sources.is_empty() || answer.trim().is_empty() {
            return Ok(Generated::unchanged(answer));
        }

        let prompt = prompts::render(
            prompts::CITATION,
            &[("sources", numbered_sources(&sources)), ("answer", answer.to_string())],
        )
        .map_err(|e| ProviderError::InvalidResponse(format!("citation prompt: {e}")))?;

        let model = BoundModel::new(self.llm.clone(), model, CompletionArguments::new(0.0, 2000));
        let (reply, usage) = model
            .complete_text(vec![Message::user(prompt)], PipelineKind::IrisCitationPipeline)
            .await?;

        let value = apply_citations(answer, &reply, &sources, base_url);
        Ok(Generated { value, usage })
    }
}

fn dedup_sources(chunks: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
    let mut unique: Vec<RetrievedChunk> = Vec::new();
    for chunk in chunks {
        let seen = unique
            .iter()
            .any(|u| u.title == chunk.title && u.link == chunk.link && u.page == chunk.page && u.content == chunk.content);
        if !seen {
            unique.push(chunk.clone());
        }
    }
    unique
}

fn numbered_sources(sources: &[RetrievedChunk]) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let kind = match s.kind {
                ContentKind::Lecture => "Lecture",
                ContentKind::Faq => "FAQ",
            };
            format!("[{}] {kind}: {}\n{}", i + 1, s.title, s.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn resolve_link(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") || base_url.is_empty() {
        return link.to_string();
    }
    format!("{}/{}", base_url.trim_end_matches('/'), link.trim_start_matches('/'))
}

/// Keep `answer` unless `reply` carries valid markers; then return the
/// reply with invalid markers stripped and a sources list appended.
pub fn apply_citations(answer: &str, reply: &str, sources: &[RetrievedChunk], base_url: &str) -> String {
    if reply.contains(NO_CITATIONS) {
        debug!("Model found nothing to cite");
        return answer.to_string();
    }

    let mut used: Vec<usize> = Vec::new();
    for caps in CITE_MARKER.captures_iter(reply) {
        if let Ok(n) = caps[1].parse::<usize>() {
            if (1..=sources.len()).contains(&n) && !used.contains(&n) {
                used.push(n);
            }
        }
    }
    if used.is_empty() {
        debug!("Citation reply contains no valid markers");
        return answer.to_string();
    }

    let cited = CITE_MARKER.replace_all(reply.trim(), |caps: &Captures| match caps[1].parse::<usize>() {
        Ok(n) if used.contains(&n) => format!("[cite:{n}]"),
        _ => {
            warn!(marker = &caps[0], "Dropping citation marker without a source");
            String::new()
        }
    });

    let mut out = cited.into_owned();
    out.push_str("\n\n**Sources**");
    for n in used {
        let source = &sources[n - 1];
        let mut line = match &source.link {
            Some(link) => format!("\n[{n}] [{}]({})", source.title, resolve_link(base_url, link)),
            None => format!("\n[{n}] {}", source.title),
        };
        if let Some(page) = source.page {
            line.push_str(&format!(", page {page}"));
        }
        out.push_str(&line);
    }
    out
}
