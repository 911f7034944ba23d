//! Prompt templates.
//!
//! Templates use `{name}` placeholders and `{{`/`}}` for literal braces;
//! they are rendered with [`render`]. Values are inserted verbatim.

use chrono::{DateTime, Utc};
use iris_agent::prompt::{PromptError, render_template};
use iris_core::domain::{ChatMessage, Sender};
use std::collections::{BTreeMap, HashMap};

pub fn render(template: &str, variables: &[(&str, String)]) -> Result<String, PromptError> {
    let variables: HashMap<String, String> = variables
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    render_template(template, &variables)
}

pub fn datetime_to_string(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub fn format_custom_instructions(instructions: &str) -> String {
    let instructions = instructions.trim();
    if instructions.is_empty() {
        return String::new();
    }
    format!(
        "\n## Additional instructions from the course staff\n\
         Follow these instructions unless they contradict the rules above:\n{instructions}\n"
    )
}

/// What the agent should focus on when the run was triggered by an event.
pub fn event_instructions(event: Option<&str>) -> &'static str {
    match event {
        Some("build_failed") => {
            "The student's latest build failed. Start by looking at the build logs and explain \
             the most likely cause without writing the fix for them."
        }
        Some("progress_stalled") => {
            "The student has not made progress for a while. Offer a small, encouraging hint \
             towards the next step of the exercise."
        }
        Some("build_with_points") => {
            "The student's latest build earned points. Acknowledge the progress briefly before \
             anything else."
        }
        _ => "",
    }
}

/// `SENDER: text` per line, skipping messages without text.
pub fn format_chat_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .filter_map(|m| {
            let text = m.first_text().filter(|t| !t.is_empty())?;
            let sender = match m.sender {
                Sender::User => "USER",
                Sender::Llm => "AI",
                Sender::Artemis => "ARTEMIS",
            };
            Some(format!("{sender}: {text}"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_repository(repository: &BTreeMap<String, String>) -> String {
    repository
        .iter()
        .map(|(path, content)| format!("{path}:\n{content}"))
        .collect::<Vec<_>>()
        .join("\n------------\n")
}

pub const EXERCISE_CHAT_SYSTEM: &str = r#"You are Iris, the AI programming tutor of the Artemis learning platform.
Current date: {current_date}

You help students with the programming exercise "{exercise_title}" ({programming_language}).
You never write the solution or large parts of it. You guide the student with questions,
hints and explanations so they can solve the exercise on their own.

Use the tools to look at the student's submission, build logs, feedback and repository before
answering questions about their code. Use lecture and FAQ retrieval for conceptual or
organisational questions. If you know things about the student from earlier conversations,
use them to tailor your answer.

{conversation_note}
{event_instructions}

## Problem statement
{problem_statement}
{custom_instructions}"#;

pub const EXERCISE_CHAT_GUIDE: &str = r#"You review answers of an AI tutor before a student sees them.
The exercise is described by this problem statement:
{problem_statement}

Rules for a good answer:
- It must not contain the solution or code that solves part of the exercise.
- It must be friendly, concise and on topic.
- Small illustrative snippets unrelated to the exercise are fine.

If the answer follows the rules, reply with exactly !ok! and nothing else.
Otherwise reply with a rewritten answer that follows the rules. Reply only with the answer
itself, without any comment about the rewrite."#;

pub const PROMPT_USER_SYSTEM: &str = r#"You are Iris, the AI tutor of the Artemis learning platform.
Current date: {current_date}

The student submitted a solution to the programming exercise "{exercise_title}" ({programming_language}).
Ask one short question about the student's own code that someone who wrote it can answer
easily. Use the tools to inspect the submission and the repository. Never reveal that the
question checks whether they wrote the code themselves. Ask exactly one question at a time.

{conversation_note}
{event_instructions}
Assessment of the previous answer: {verdict}

## Problem statement
{problem_statement}"#;

pub const PROMPT_USER_GUIDE: &str = r#"You review questions an AI tutor asks a student about their {programming_language} submission.
The exercise is described by this problem statement:
{problem_statement}

A good question asks about one concrete part of the student's code, is answerable in a few
sentences and does not give away any solution.

If the question is good, reply with exactly !ok! and nothing else.
Otherwise reply with an improved question only."#;

pub const CITATION: &str = r#"Add citations to the answer below using the numbered sources.
Insert a marker [cite:N] directly after every sentence that uses information from source N.
Do not change the answer in any other way. Only cite sources that were actually used.
If no source was used, reply with exactly !NONE!

## Sources
{sources}

## Answer
{answer}"#;

pub const INTERACTION_SUGGESTIONS: &str = r#"A student is chatting with an AI tutor about a programming exercise.
Suggest up to three short follow-up questions the student could ask next, written from the
student's perspective. They must build on the tutor's last message.

Reply with a JSON array of strings only, for example ["How do I ...?", "Why does ...?"].

## Conversation
{chat_history}

## Last message of the tutor
{last_message}"#;

pub const ASSESS_USER_ANSWER: &str = r#"# Answer assessment

Decide whether the student's answer shows that they wrote their submission themselves.

## Inputs
Question that was asked: {question}
Answer of the student: {answer}

Exercise template:
{template}

Exercise description:
{task}

Student submission:
{files}

Conversation so far:
{chat_history}

Questions asked so far: {questions_asked}
Minimum number of questions: {min_questions}
Maximum number of questions: {max_questions}

## Rules
- A clear answer that shows understanding of the student's own code is unsuspicious.
- An answer that clearly shows a lack of understanding is suspicious.
- An ambiguous or incomplete answer needs a follow-up question, as long as fewer than the
  maximum number of questions were asked.
- While fewer than the minimum number of questions were asked, always ask a follow-up question.
- Use clarify when the answer does not address the question at all.
- Ignore optional tasks.

## Output
Reply with a JSON object only:
{{"verdict": one of {verdicts}, "reasoning": "at most two sentences"}}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_render_with_their_variables() {
        let rendered = render(
            ASSESS_USER_ANSWER,
            &[
                ("question", "What does foo do?".into()),
                ("answer", "It sorts {the} list".into()),
                ("template", String::new()),
                ("task", String::new()),
                ("files", String::new()),
                ("chat_history", String::new()),
                ("questions_asked", "1".into()),
                ("min_questions", "2".into()),
                ("max_questions", "5".into()),
                ("verdicts", "suspicious, unsuspicious".into()),
            ],
        )
        .unwrap();
        assert!(rendered.contains("Answer of the student: It sorts {the} list"));
        assert!(rendered.contains(r#"{"verdict": one of suspicious, unsuspicious"#));
    }

    #[test]
    fn missing_variable_is_an_error() {
        assert!(render(CITATION, &[("answer", "x".into())]).is_err());
    }

    #[test]
    fn chat_history_skips_empty_messages() {
        let history = vec![
            ChatMessage::text(Sender::User, "Hi"),
            ChatMessage::text(Sender::Llm, ""),
            ChatMessage::text(Sender::Llm, "Hello!"),
        ];
        assert_eq!(format_chat_history(&history), "USER: Hi\nAI: Hello!");
    }

    #[test]
    fn custom_instructions_are_optional() {
        assert_eq!(format_custom_instructions("  "), "");
        assert!(format_custom_instructions("Answer in German").contains("Answer in German"));
    }
}
