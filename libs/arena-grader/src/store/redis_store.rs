use super::{apply_draft, apply_grade, GradeRecord, StoreError, SubmissionStore};
use arena_common::redis::{grading_key, submission_index_key, submission_key, team_key};
use arena_common::types::{DraftContent, Question, Submission, Team};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;

/// Sets score/submitted/end_time in one step unless already submitted.
/// Returns 1 on transition, 0 if already submitted, -1 if the team is unknown.
const FINALIZE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'submitted') == '1' then
    return 0
end
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
redis.call('HSET', KEYS[1], 'score', ARGV[1], 'submitted', '1', 'end_time', ARGV[2])
return 1
"#;

/// Writes a submission unless the team is submitted.
/// KEYS: team, submission, index, grading claim. ARGV: json, question id, mode.
/// Returns 1 on write, 0 if submitted, -1 if a draft hit a live claim.
const WRITE_SCRIPT: &str = r#"
if redis.call('HGET', KEYS[1], 'submitted') == '1' then
    return 0
end
if ARGV[3] == 'draft' and redis.call('EXISTS', KEYS[4]) == 1 then
    return -1
end
redis.call('SET', KEYS[2], ARGV[1])
redis.call('SADD', KEYS[3], ARGV[2])
return 1
"#;

/// Takes the grading claim for ARGV[1] with a PX lease of ARGV[2].
/// Returns 1 when held, 0 if submitted or held by another token, -1 if the team is unknown.
const CLAIM_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
if redis.call('HGET', KEYS[1], 'submitted') == '1' then
    return 0
end
local holder = redis.call('GET', KEYS[2])
if holder and holder ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[2], ARGV[1], 'PX', ARGV[2])
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone, Copy)]
enum WriteMode {
    Draft,
    Grade,
}

impl WriteMode {
    fn as_str(self) -> &'static str {
        match self {
            WriteMode::Draft => "draft",
            WriteMode::Grade => "grade",
        }
    }
}

/// Redis-backed store
///
/// The submitted and claim guards run inside Lua, so a write never lands
/// after finalize. The read half of read-modify-write is not atomic; drafts
/// are serialized per team in-process, and grade writes only happen under the
/// grading claim, which blocks drafts.
pub struct RedisStore {
    redis: ConnectionManager,
    finalize: redis::Script,
    write: redis::Script,
    claim: redis::Script,
    release: redis::Script,
}

impl RedisStore {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            finalize: redis::Script::new(FINALIZE_SCRIPT),
            write: redis::Script::new(WRITE_SCRIPT),
            claim: redis::Script::new(CLAIM_SCRIPT),
            release: redis::Script::new(RELEASE_SCRIPT),
        }
    }

    async fn load_or_blank(
        &self,
        conn: &mut ConnectionManager,
        team_id: &str,
        question: &Question,
        now: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let key = submission_key(team_id, &question.question_id);
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(json) => decode_submission(&key, &json),
            None => Ok(Submission::blank(team_id, question, now)),
        }
    }

    async fn store(
        &self,
        conn: &mut ConnectionManager,
        submission: &Submission,
        mode: WriteMode,
    ) -> Result<(), StoreError> {
        let team_id = &submission.team_id;
        let key = submission_key(team_id, &submission.question_id);
        let json = serde_json::to_string(submission).map_err(|e| StoreError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;

        let outcome: i64 = self
            .write
            .key(team_key(team_id))
            .key(&key)
            .key(submission_index_key(team_id))
            .key(grading_key(team_id))
            .arg(json)
            .arg(&submission.question_id)
            .arg(mode.as_str())
            .invoke_async(conn)
            .await?;

        match outcome {
            1 => Ok(()),
            0 => Err(StoreError::Finalized(team_id.clone())),
            _ => Err(StoreError::Claimed(team_id.clone())),
        }
    }
}

fn decode_submission(key: &str, json: &str) -> Result<Submission, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode_team(team_id: &str, fields: HashMap<String, String>) -> Result<Team, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        key: team_key(team_id),
        reason,
    };

    let score = match fields.get("score") {
        Some(raw) => raw.parse().map_err(|_| corrupt(format!("bad score {:?}", raw)))?,
        None => 0,
    };
    let submitted = fields.get("submitted").map(|v| v == "1").unwrap_or(false);
    let end_time = match fields.get("end_time").filter(|v| !v.is_empty()) {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| corrupt(format!("bad end_time: {}", e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(Team {
        team_id: team_id.to_string(),
        score,
        submitted,
        end_time,
    })
}

#[async_trait]
impl SubmissionStore for RedisStore {
    async fn team(&self, team_id: &str) -> Result<Option<Team>, StoreError> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(team_key(team_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        decode_team(team_id, fields).map(Some)
    }

    async fn register_team(&self, team_id: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let key = team_key(team_id);
        redis::pipe()
            .atomic()
            .hset_nx(&key, "score", 0)
            .ignore()
            .hset_nx(&key, "submitted", "0")
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn submission(
        &self,
        team_id: &str,
        question_id: &str,
    ) -> Result<Option<Submission>, StoreError> {
        let mut conn = self.redis.clone();
        let key = submission_key(team_id, question_id);
        let raw: Option<String> = conn.get(&key).await?;
        raw.map(|json| decode_submission(&key, &json)).transpose()
    }

    async fn submissions(&self, team_id: &str) -> Result<Vec<Submission>, StoreError> {
        let mut conn = self.redis.clone();
        let mut question_ids: Vec<String> = conn.smembers(submission_index_key(team_id)).await?;
        if question_ids.is_empty() {
            return Ok(Vec::new());
        }
        question_ids.sort();

        let keys: Vec<String> = question_ids
            .iter()
            .map(|q| submission_key(team_id, q))
            .collect();
        let mut pipe = redis::pipe();
        for key in &keys {
            pipe.get(key);
        }
        let values: Vec<Option<String>> = pipe.query_async(&mut conn).await?;

        keys.iter()
            .zip(values)
            .filter_map(|(key, raw)| raw.map(|json| decode_submission(key, &json)))
            .collect()
    }

    async fn save_draft(
        &self,
        team_id: &str,
        question: &Question,
        draft: &DraftContent,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let now = Utc::now();
        let mut submission = self.load_or_blank(&mut conn, team_id, question, now).await?;
        apply_draft(&mut submission, draft, now);
        self.store(&mut conn, &submission, WriteMode::Draft).await
    }

    async fn record_grade(
        &self,
        team_id: &str,
        question: &Question,
        grade: &GradeRecord,
    ) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let now = Utc::now();
        let mut submission = self.load_or_blank(&mut conn, team_id, question, now).await?;
        apply_grade(&mut submission, grade, now);
        self.store(&mut conn, &submission, WriteMode::Grade).await
    }

    async fn finalize_team(
        &self,
        team_id: &str,
        score: u32,
        end_time: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let outcome: i64 = self
            .finalize
            .key(team_key(team_id))
            .arg(score)
            .arg(end_time.to_rfc3339())
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => Ok(true),
            0 => Ok(false),
            _ => Err(StoreError::TeamNotFound(team_id.to_string())),
        }
    }

    async fn claim_grading(
        &self,
        team_id: &str,
        token: &str,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let outcome: i64 = self
            .claim
            .key(team_key(team_id))
            .key(grading_key(team_id))
            .arg(token)
            .arg(lease.as_millis().max(1) as u64)
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => Ok(true),
            0 => Ok(false),
            _ => Err(StoreError::TeamNotFound(team_id.to_string())),
        }
    }

    async fn release_grading(&self, team_id: &str, token: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let _: i64 = self
            .release
            .key(grading_key(team_id))
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
