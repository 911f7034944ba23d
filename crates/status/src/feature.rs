use iris_core::Stage;
use serde::{Deserialize, Serialize};

pub const MEMORY_STAGE: &str = "Extracting memories";

/// The pipelines Artemis can trigger, with their status layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineFeature {
    #[serde(rename = "PROGRAMMING_EXERCISE_CHAT")]
    ExerciseChat,
    PromptUser,
}

/// Which optional fields a feature's status update carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusShape {
    pub suggestions: bool,
    pub verdict: bool,
    pub memories: bool,
}

impl PipelineFeature {
    /// URL segment of the status endpoint and of the run route.
    pub fn path(self) -> &'static str {
        match self {
            Self::ExerciseChat => "programming-exercise-chat",
            Self::PromptUser => "programming-exercise-prompt-user",
        }
    }

    /// Parses the feature name used by the variants route.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "PROGRAMMING_EXERCISE_CHAT" => Some(Self::ExerciseChat),
            "PROMPT_USER" => Some(Self::PromptUser),
            _ => None,
        }
    }

    pub fn stages(self) -> Vec<Stage> {
        let mut stages = match self {
            Self::ExerciseChat => vec![
                Stage::new("Checking available information", 30),
                Stage::new("Creating suggestions", 10),
            ],
            Self::PromptUser => vec![
                Stage::new("Checking available information", 30),
                Stage::new("Thinking of question", 10),
            ],
        };
        stages.push(Stage::new(MEMORY_STAGE, 10));
        stages
    }

    pub fn shape(self) -> StatusShape {
        match self {
            Self::ExerciseChat => StatusShape {
                suggestions: true,
                verdict: false,
                memories: true,
            },
            Self::PromptUser => StatusShape {
                suggestions: false,
                verdict: true,
                memories: true,
            },
        }
    }
}

impl std::fmt::Display for PipelineFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}
