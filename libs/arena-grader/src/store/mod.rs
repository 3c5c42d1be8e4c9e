//! Persistence for teams and submissions.
//!
//! One Submission per (team, question), upserted in place. `finalize_team`
//! is a compare-and-set on `submitted`: score, flag and end time become
//! visible together or not at all.
//!
//! Grading is gated by a lease (`claim_grading`) so instances sharing a store
//! never grade the same team twice. Once a team is submitted every draft or
//! grade write is refused with [`StoreError::Finalized`]; drafts are also
//! refused with [`StoreError::Claimed`] while a claim is live.

mod memory;
mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

use arena_common::types::{DraftContent, Question, Submission, Team, TestCaseResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("team not found: {0}")]
    TeamNotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("team {0} is already submitted")]
    Finalized(String),

    #[error("team {0} is being graded")]
    Claimed(String),
}

/// Grading output written for one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeRecord {
    pub marks: u32,
    pub max_marks: u32,
    pub output: String,
    pub test_results: Vec<TestCaseResult>,
    pub error: Option<String>,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn team(&self, team_id: &str) -> Result<Option<Team>, StoreError>;

    /// Create the team record if absent; existing teams are left untouched
    async fn register_team(&self, team_id: &str) -> Result<(), StoreError>;

    async fn submission(
        &self,
        team_id: &str,
        question_id: &str,
    ) -> Result<Option<Submission>, StoreError>;

    /// All submissions of a team, ordered by question id
    async fn submissions(&self, team_id: &str) -> Result<Vec<Submission>, StoreError>;

    /// Upsert the draft fields; absent fields are stored as empty strings.
    /// Refused once the team is submitted or while a grading claim is live.
    async fn save_draft(
        &self,
        team_id: &str,
        question: &Question,
        draft: &DraftContent,
    ) -> Result<(), StoreError>;

    /// Upsert marks, output and test results and mark the submission evaluated.
    /// Refused once the team is submitted.
    async fn record_grade(
        &self,
        team_id: &str,
        question: &Question,
        grade: &GradeRecord,
    ) -> Result<(), StoreError>;

    /// Atomically set score, submitted=true and end_time.
    /// Returns false without writing when the team was already submitted.
    async fn finalize_team(
        &self,
        team_id: &str,
        score: u32,
        end_time: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Take the team's grading claim for `lease`.
    /// Returns false when the team is submitted or another token holds a live claim.
    /// Re-claiming with the holder's own token extends the lease.
    async fn claim_grading(
        &self,
        team_id: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, StoreError>;

    /// Drop the claim if `token` still holds it
    async fn release_grading(&self, team_id: &str, token: &str) -> Result<(), StoreError>;
}

fn apply_draft(submission: &mut Submission, draft: &DraftContent, now: DateTime<Utc>) {
    submission.code = draft.code.clone().unwrap_or_default();
    submission.selected_option = draft.selected_option.clone().unwrap_or_default();
    submission.updated_at = now;
}

fn apply_grade(submission: &mut Submission, grade: &GradeRecord, now: DateTime<Utc>) {
    submission.marks = grade.marks;
    submission.max_marks = grade.max_marks;
    submission.output = grade.output.clone();
    submission.test_results = grade.test_results.clone();
    submission.error = grade.error.clone();
    submission.evaluated = true;
    submission.updated_at = now;
}
