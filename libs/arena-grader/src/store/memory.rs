use super::{apply_draft, apply_grade, GradeRecord, StoreError, SubmissionStore};
use arena_common::types::{DraftContent, Question, Submission, Team};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    teams: HashMap<String, Team>,
    // team -> question -> submission
    submissions: HashMap<String, BTreeMap<String, Submission>>,
    // team -> (token, lease expiry)
    claims: HashMap<String, (String, Instant)>,
}

impl Tables {
    fn is_submitted(&self, team_id: &str) -> bool {
        self.teams.get(team_id).map(|t| t.submitted).unwrap_or(false)
    }

    fn live_claim(&self, team_id: &str) -> Option<&str> {
        self.claims
            .get(team_id)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(token, _)| token.as_str())
    }

    fn upsert(&mut self, team_id: &str, question: &Question, now: DateTime<Utc>) -> &mut Submission {
        self.submissions
            .entry(team_id.to_string())
            .or_default()
            .entry(question.question_id.clone())
            .or_insert_with(|| Submission::blank(team_id, question, now))
    }
}

/// Process-local store used by tests, the CLI and single-node deployments
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_teams<I, S>(team_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        {
            let mut tables = store.tables.write().await;
            for id in team_ids {
                let id = id.into();
                tables.teams.insert(id.clone(), Team::new(id));
            }
        }
        store
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn team(&self, team_id: &str) -> Result<Option<Team>, StoreError> {
        Ok(self.tables.read().await.teams.get(team_id).cloned())
    }

    async fn register_team(&self, team_id: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .teams
            .entry(team_id.to_string())
            .or_insert_with(|| Team::new(team_id));
        Ok(())
    }

    async fn submission(
        &self,
        team_id: &str,
        question_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .submissions
            .get(team_id)
            .and_then(|subs| subs.get(question_id))
            .cloned())
    }

    async fn submissions(&self, team_id: &str) -> Result<Vec<Submission>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .submissions
            .get(team_id)
            .map(|subs| subs.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_draft(
        &self,
        team_id: &str,
        question: &Question,
        draft: &DraftContent,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        if tables.is_submitted(team_id) {
            return Err(StoreError::Finalized(team_id.to_string()));
        }
        if tables.live_claim(team_id).is_some() {
            return Err(StoreError::Claimed(team_id.to_string()));
        }
        apply_draft(tables.upsert(team_id, question, now), draft, now);
        Ok(())
    }

    async fn record_grade(
        &self,
        team_id: &str,
        question: &Question,
        grade: &GradeRecord,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.write().await;
        if tables.is_submitted(team_id) {
            return Err(StoreError::Finalized(team_id.to_string()));
        }
        apply_grade(tables.upsert(team_id, question, now), grade, now);
        Ok(())
    }

    async fn finalize_team(
        &self,
        team_id: &str,
        score: u32,
        end_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let team = tables
            .teams
            .get_mut(team_id)
            .ok_or_else(|| StoreError::TeamNotFound(team_id.to_string()))?;

        if team.submitted {
            return Ok(false);
        }

        team.score = score;
        team.submitted = true;
        team.end_time = Some(end_time);
        Ok(true)
    }

    async fn claim_grading(
        &self,
        team_id: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let team = tables
            .teams
            .get(team_id)
            .ok_or_else(|| StoreError::TeamNotFound(team_id.to_string()))?;
        if team.submitted {
            return Ok(false);
        }
        if matches!(tables.live_claim(team_id), Some(holder) if holder != token) {
            return Ok(false);
        }

        tables
            .claims
            .insert(team_id.to_string(), (token.to_string(), Instant::now() + lease));
        Ok(true)
    }

    async fn release_grading(&self, team_id: &str, token: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if matches!(tables.claims.get(team_id), Some((holder, _)) if holder == token) {
            tables.claims.remove(team_id);
        }
        Ok(())
    }
}
