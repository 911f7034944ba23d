//! Agent tools for Iris.
//!
//! Tools let the agent look at the student's submission and repository,
//! search course content and recall what it knows about the student.
//! They are built per run around that run's data and status callback;
//! none of them fail on bad model input.

pub mod exercise;
pub mod memory;
pub mod repository;
pub mod retrieval;
pub mod submission;

use iris_core::domain::{ProgrammingExercise, ProgrammingSubmission};
use iris_core::scratch::Scratchpad;
use iris_core::tool::ToolRegistry;
use iris_memory::MemoryCoordinator;
use iris_status::StatusCallback;
use std::sync::Arc;

pub use exercise::ExerciseDetailsTool;
pub use memory::{MemorySearchTool, SimilarMemoriesTool};
pub use repository::{FileLookupTool, RepositoryFilesTool};
pub use retrieval::ContentRetrievalTool;
pub use submission::{BuildLogsTool, FeedbacksTool, SubmissionDetailsTool};

/// Register the tools every exercise pipeline offers: submission details,
/// exercise details, build logs, feedbacks, repository files and file lookup.
pub fn register_submission_tools(
    registry: &mut ToolRegistry,
    callback: &StatusCallback,
    exercise: Option<&ProgrammingExercise>,
    submission: Option<&ProgrammingSubmission>,
) {
    let repository = Arc::new(submission.map(|s| s.repository.clone()).unwrap_or_default());

    registry.register(Box::new(SubmissionDetailsTool::new(submission.cloned(), callback.clone())));
    registry.register(Box::new(ExerciseDetailsTool::new(exercise.cloned(), callback.clone())));
    registry.register(Box::new(BuildLogsTool::new(submission.cloned(), callback.clone())));
    registry.register(Box::new(FeedbacksTool::new(submission.cloned(), callback.clone())));
    registry.register(Box::new(RepositoryFilesTool::new(repository.clone(), callback.clone())));
    registry.register(Box::new(FileLookupTool::new(repository, callback.clone())));
}

/// Register `memory_search` and `find_similar_memories`.
pub fn register_memory_tools(
    registry: &mut ToolRegistry,
    memory: &MemoryCoordinator,
    scratch: &Scratchpad,
    limit: usize,
) {
    registry.register(Box::new(MemorySearchTool::new(memory.clone(), scratch.clone(), limit)));
    registry.register(Box::new(SimilarMemoriesTool::new(memory.clone(), scratch.clone(), limit)));
}
