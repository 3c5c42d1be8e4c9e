//! Code-grading engine for the contest platform.
//!
//! Layers, leaves first:
//! - [`sandbox`] compiles and runs one program against one input
//! - [`evaluator`] drives the sandbox over a question's test cases and scores them
//! - [`orchestrator`] grades every question for one team
//! - [`submission`] owns the draft -> finalized lifecycle and the per-team gate

pub mod evaluator;
pub mod notify;
pub mod orchestrator;
pub mod sandbox;
pub mod store;
pub mod submission;

#[cfg(test)]
mod testing;

pub use evaluator::{evaluate, normalize_output, Evaluation};
pub use notify::{LogNotifier, NotifyError, RedisNotifier, ScoreNotifier};
pub use orchestrator::{Grader, GradingSummary, QuestionGrade};
pub use sandbox::{ProcessSandbox, Sandbox};
pub use store::{GradeRecord, InMemoryStore, RedisStore, StoreError, SubmissionStore};
pub use submission::{SubmissionError, SubmissionService, SubmitOutcome};
