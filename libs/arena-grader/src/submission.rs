/// Submission State Machine - Draft to Finalized, Exactly Once
///
/// **States:**
/// - Drafting: team may save drafts; `submit` runs grading
/// - Finalized: terminal; drafts rejected, `submit` returns the stored score
///
/// **Concurrency:**
/// Within a process every draft save and submit for a team runs under that
/// team's async lock, so the check-then-transition sequence is never
/// interleaved. Across processes sharing a store, grading additionally
/// requires the store's grading claim: the instance that loses the claim
/// waits for the holder to finalize and returns the stored score. Teams never
/// wait on each other.
///
/// **Finalize:**
/// Score, `submitted` and end time are written by one compare-and-set store
/// call after every per-question write. That call is retried a bounded
/// number of times; if it still fails the error is returned and the team
/// stays in Drafting.

use crate::notify::ScoreNotifier;
use crate::orchestrator::{Grader, GradingSummary};
use crate::store::{StoreError, SubmissionStore};
use arena_common::types::{DraftContent, ScoreEvent, Submission, Team};
use arena_common::{Config, ContestConfig};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FINALIZE_BACKOFF: Duration = Duration::from_millis(100);
const CLAIM_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("team not found: {0}")]
    TeamNotFound(String),

    #[error("question not found: {0}")]
    QuestionNotFound(String),

    #[error("team {0} has already submitted")]
    AlreadyFinalized(String),

    #[error("team {0} is being graded")]
    GradingInProgress(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Response of `submit`
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub team_id: String,
    pub score: u32,
    /// True when the team was already finalized and grading did not run
    pub already_submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grading: Option<GradingSummary>,
}

impl SubmitOutcome {
    fn recorded(team: &Team) -> Self {
        Self {
            team_id: team.team_id.clone(),
            score: team.score,
            already_submitted: true,
            grading: None,
        }
    }
}

/// One async mutex per known team, created on first use
#[derive(Default)]
struct TeamLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TeamLocks {
    fn for_team(&self, team_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(team_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct SubmissionService {
    store: Arc<dyn SubmissionStore>,
    grader: Grader,
    notifier: Arc<dyn ScoreNotifier>,
    locks: TeamLocks,
    finalize_attempts: u32,
    grading_lease: Duration,
}

impl SubmissionService {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        grader: Grader,
        notifier: Arc<dyn ScoreNotifier>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            grader,
            notifier,
            locks: TeamLocks::default(),
            finalize_attempts: config.finalize_attempts.max(1),
            grading_lease: config.grading_lease(),
        }
    }

    pub fn contest(&self) -> &ContestConfig {
        self.grader.contest()
    }

    /// Upsert a team's draft for one question. Rejected once the team is finalized.
    pub async fn save_draft(
        &self,
        team_id: &str,
        question_id: &str,
        draft: DraftContent,
    ) -> Result<(), SubmissionError> {
        // unknown teams never get a lock entry
        self.load_team(team_id).await?;
        let lock = self.locks.for_team(team_id);
        let _guard = lock.lock().await;

        let team = self.load_team(team_id).await?;
        if team.submitted {
            return Err(SubmissionError::AlreadyFinalized(team_id.to_string()));
        }

        let question = self
            .contest()
            .question(question_id)
            .ok_or_else(|| SubmissionError::QuestionNotFound(question_id.to_string()))?;

        match self.store.save_draft(team_id, question, &draft).await {
            Ok(()) => Ok(()),
            Err(StoreError::Finalized(_)) => Err(SubmissionError::AlreadyFinalized(team_id.to_string())),
            Err(StoreError::Claimed(_)) => Err(SubmissionError::GradingInProgress(team_id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Finalize the team, grading at most once.
    pub async fn submit(&self, team_id: &str) -> Result<SubmitOutcome, SubmissionError> {
        let team = self.load_team(team_id).await?;
        if team.submitted {
            info!(team_id, score = team.score, "Submit repeated; returning recorded score");
            return Ok(SubmitOutcome::recorded(&team));
        }

        let lock = self.locks.for_team(team_id);
        let _guard = lock.lock().await;

        let team = self.load_team(team_id).await?;
        if team.submitted {
            info!(team_id, score = team.score, "Submit repeated; returning recorded score");
            return Ok(SubmitOutcome::recorded(&team));
        }

        let token = Uuid::new_v4().to_string();
        if let Some(team) = self.acquire_claim(team_id, &token).await? {
            info!(team_id, score = team.score, "Team graded by another instance; returning recorded score");
            return Ok(SubmitOutcome::recorded(&team));
        }

        let graded = self.grade_and_finalize(team_id).await;
        if let Err(e) = self.store.release_grading(team_id, &token).await {
            warn!(team_id, error = %e, "Failed to release grading claim; it expires with the lease");
        }

        let Some(summary) = graded? else {
            let team = self.load_team(team_id).await?;
            warn!(team_id, score = team.score, "Team finalized concurrently; keeping stored score");
            return Ok(SubmitOutcome::recorded(&team));
        };
        let score = summary.total_score;

        info!(team_id, score, "Submission finalized");

        let event = ScoreEvent {
            team_id: team_id.to_string(),
            score,
        };
        if let Err(e) = self.notifier.score_updated(&event).await {
            warn!(team_id, error = %e, "Failed to publish score update");
        }

        Ok(SubmitOutcome {
            team_id: team_id.to_string(),
            score,
            already_submitted: false,
            grading: Some(summary),
        })
    }

    pub async fn team(&self, team_id: &str) -> Result<Team, SubmissionError> {
        self.load_team(team_id).await
    }

    /// Drafts and grading results of one team, ordered by question id
    pub async fn submissions(&self, team_id: &str) -> Result<Vec<Submission>, SubmissionError> {
        self.load_team(team_id).await?;
        Ok(self.store.submissions(team_id).await?)
    }

    async fn load_team(&self, team_id: &str) -> Result<Team, SubmissionError> {
        self.store
            .team(team_id)
            .await?
            .ok_or_else(|| SubmissionError::TeamNotFound(team_id.to_string()))
    }

    /// Block until this instance holds the grading claim.
    /// Returns the team instead if it was finalized while waiting.
    async fn acquire_claim(&self, team_id: &str, token: &str) -> Result<Option<Team>, SubmissionError> {
        loop {
            if self.store.claim_grading(team_id, token, self.grading_lease).await? {
                return Ok(None);
            }
            let team = self.load_team(team_id).await?;
            if team.submitted {
                return Ok(Some(team));
            }
            debug!(team_id, "Grading claimed by another instance; waiting");
            tokio::time::sleep(CLAIM_POLL).await;
        }
    }

    /// Grade every question then finalize.
    /// `None` means another writer finalized the team first.
    async fn grade_and_finalize(&self, team_id: &str) -> Result<Option<GradingSummary>, SubmissionError> {
        let summary = match self.grader.grade_submission(team_id).await {
            Ok(summary) => summary,
            Err(StoreError::Finalized(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if self.finalize(team_id, summary.total_score).await? {
            Ok(Some(summary))
        } else {
            Ok(None)
        }
    }

    async fn finalize(&self, team_id: &str, score: u32) -> Result<bool, StoreError> {
        let mut attempt = 1;
        loop {
            match self.store.finalize_team(team_id, score, Utc::now()).await {
                Ok(transitioned) => return Ok(transitioned),
                Err(e) if attempt < self.finalize_attempts => {
                    warn!(team_id, attempt, error = %e, "Finalize write failed; retrying");
                    tokio::time::sleep(FINALIZE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
