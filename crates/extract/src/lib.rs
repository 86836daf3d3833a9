//! Turns free-form model output into validated study data: unit lists,
//! day-by-day schedules and multiple-choice quizzes.

pub mod error;
pub mod llm;
pub mod parser;
pub mod prompt;
pub mod schema;
pub mod tasks;

pub use error::{ExtractionError, ExtractionFailure, TaskError, TransportError, TransportErrorKind};
pub use llm::{GenerationResult, OllamaClient, TextGenerator};
pub use parser::{extract, ExtractionOutcome};
pub use schema::{
    Answer, ExtractionTarget, GenerationRequest, Quiz, QuizQuestion, ScheduleDay, UnitSummary,
};
pub use tasks::{AskRequest, QuizRequest, ScheduleRequest, StudyTasks, UnitsRequest};
