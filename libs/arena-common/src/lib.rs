pub mod config;
pub mod contest;
pub mod redis;
pub mod types;

// Re-export commonly used types for convenience
pub use config::Config;
pub use contest::{ConfigError, ContestConfig};
pub use types::{
    DraftContent, ExecutionResult, FailureKind, Question, QuestionKind, ScoreEvent, Submission,
    SubmissionState, Team, TestCase, TestCaseResult,
};
