//! Progress stages reported to Artemis.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    NotStarted,
    InProgress,
    Done,
    Error,
    Skipped,
}

impl StageState {
    /// DONE, ERROR and SKIPPED never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Skipped)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// One weighted step of a run, as shown in the Artemis progress bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub weight: u32,
    pub state: StageState,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub internal: bool,
}

impl Stage {
    pub fn new(name: impl Into<String>, weight: u32) -> Self {
        Self {
            name: name.into(),
            weight,
            state: StageState::NotStarted,
            message: None,
            internal: false,
        }
    }
}
