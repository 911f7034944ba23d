//! Prompt assembly.
//!
//! A [`ChatPrompt`] is a template: system text is stored with its braces
//! escaped (`{` → `{{`) and is unescaped exactly once when the prompt is
//! rendered. History messages are literal and are never touched. The
//! `agent_scratchpad` placeholder is replaced by the tool-call messages of
//! the current agent run.

use iris_core::domain::ChatMessage;
use iris_core::message::{Message, Role};
use std::collections::HashMap;

pub const AGENT_SCRATCHPAD: &str = "agent_scratchpad";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PromptError {
    #[error("missing template variable '{0}'")]
    MissingVariable(String),

    #[error("unbalanced '{brace}' at byte {position}")]
    UnbalancedBrace { brace: char, position: usize },
}

/// Double every brace so the text renders back to itself.
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

/// Render a template: `{{`/`}}` become literal braces, `{name}` is looked up
/// in `variables`.
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> Result<String, PromptError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '{' if chars.peek().is_some_and(|(_, n)| *n == '{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek().is_some_and(|(_, n)| *n == '}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, ch)) => name.push(ch),
                        None => return Err(PromptError::UnbalancedBrace { brace: '{', position: i }),
                    }
                }
                let value = variables
                    .get(name.trim())
                    .ok_or_else(|| PromptError::MissingVariable(name.trim().to_string()))?;
                out.push_str(value);
            }
            '}' => return Err(PromptError::UnbalancedBrace { brace: '}', position: i }),
            _ => out.push(c),
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
enum PromptPart {
    Template { role: Role, template: String },
    Messages(Vec<Message>),
    Placeholder(String),
}

#[derive(Debug, Clone, Default)]
pub struct ChatPrompt {
    parts: Vec<PromptPart>,
}

impl ChatPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// System text (escaped), then the history, then the agent scratchpad.
    pub fn assemble(system: &str, history: &[ChatMessage]) -> Self {
        Self::new()
            .template(Role::System, escape_braces(system))
            .messages(history.iter().map(ChatMessage::to_message).collect())
            .placeholder(AGENT_SCRATCHPAD)
    }

    pub fn template(mut self, role: Role, template: impl Into<String>) -> Self {
        self.parts.push(PromptPart::Template {
            role,
            template: template.into(),
        });
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.parts.push(PromptPart::Messages(messages));
        self
    }

    pub fn placeholder(mut self, name: impl Into<String>) -> Self {
        self.parts.push(PromptPart::Placeholder(name.into()));
        self
    }

    /// Literal messages in the prompt, in order (the chat history).
    pub fn history(&self) -> Vec<&Message> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Messages(m) => Some(m),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Render with the given scratchpad messages. Placeholders other than
    /// the scratchpad render empty.
    pub fn render(&self, scratchpad: &[Message]) -> Result<Vec<Message>, PromptError> {
        let variables = HashMap::new();
        let mut rendered = Vec::new();
        for part in &self.parts {
            match part {
                PromptPart::Template { role, template } => {
                    let content = render_template(template, &variables)?;
                    rendered.push(match role {
                        Role::System => Message::system(content),
                        Role::Assistant => Message::assistant(content),
                        _ => Message::user(content),
                    });
                }
                PromptPart::Messages(messages) => rendered.extend(messages.iter().cloned()),
                PromptPart::Placeholder(name) if name == AGENT_SCRATCHPAD => {
                    rendered.extend(scratchpad.iter().cloned());
                }
                PromptPart::Placeholder(_) => {}
            }
        }
        Ok(rendered)
    }
}
