// HTTP route handlers for the Arena API

use arena_common::types::{DraftContent, SubmissionState};
use arena_grader::SubmissionError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::{metrics, AppState};

/// Error body `{ "error": ... }` with the status chosen by the failure kind
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        let status = match &e {
            SubmissionError::TeamNotFound(_) | SubmissionError::QuestionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            SubmissionError::AlreadyFinalized(_) | SubmissionError::GradingInProgress(_) => {
                StatusCode::CONFLICT
            }
            SubmissionError::Store(store_err) => {
                error!(error = %store_err, "Store failure while serving request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub team_id: String,
    pub score: u32,
    pub submitted: bool,
    pub end_time: Option<DateTime<Utc>>,
    pub state: SubmissionState,
}

#[derive(Debug, Serialize)]
pub struct DraftView {
    pub code: String,
    pub selected_option: String,
    pub output: String,
    pub marks: u32,
    pub evaluated: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub score: u32,
}

/// GET /health
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render_metrics(),
    )
}

/// GET /questions - question set without answers or test cases
pub async fn list_questions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.contest().sanitized())
}

/// GET /teams/:team_id
pub async fn team_state(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Json<TeamResponse>, ApiError> {
    let team = state.service.team(&team_id).await?;
    let lifecycle = team.state();
    Ok(Json(TeamResponse {
        team_id: team.team_id,
        score: team.score,
        submitted: team.submitted,
        end_time: team.end_time,
        state: lifecycle,
    }))
}

/// GET /teams/:team_id/drafts - question id -> draft
pub async fn list_drafts(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Json<BTreeMap<String, DraftView>>, ApiError> {
    let drafts = state
        .service
        .submissions(&team_id)
        .await?
        .into_iter()
        .map(|s| {
            (
                s.question_id,
                DraftView {
                    code: s.code,
                    selected_option: s.selected_option,
                    output: s.output,
                    marks: s.marks,
                    evaluated: s.evaluated,
                },
            )
        })
        .collect();
    Ok(Json(drafts))
}

/// PUT /teams/:team_id/drafts/:question_id
pub async fn save_draft(
    State(state): State<Arc<AppState>>,
    Path((team_id, question_id)): Path<(String, String)>,
    Json(draft): Json<DraftContent>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .save_draft(&team_id, &question_id, draft)
        .await?;
    metrics::record_draft_saved();
    Ok(Json(json!({ "message": "Draft saved" })))
}

/// POST /teams/:team_id/submit
///
/// Grading runs in its own task. If the deadline passes first the caller
/// gets 504 while grading continues and finalizes normally; a later submit
/// returns the recorded score.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let started = Instant::now();
    let service = state.service.clone();
    let task_team = team_id.clone();
    let task = tokio::spawn(async move { service.submit(&task_team).await });

    let joined = tokio::time::timeout(state.submit_deadline, task).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let outcome = match joined {
        Ok(Ok(Ok(outcome))) => outcome,
        Ok(Ok(Err(e))) => {
            metrics::record_submit("rejected", elapsed_ms);
            return Err(e.into());
        }
        Ok(Err(join_err)) => {
            error!(team_id = %team_id, error = %join_err, "Submit task failed");
            metrics::record_submit("error", elapsed_ms);
            return Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "grading task failed",
            ));
        }
        Err(_) => {
            warn!(team_id = %team_id, deadline_ms = state.submit_deadline.as_millis() as u64, "Submit deadline exceeded; grading continues");
            metrics::record_submit("timeout", elapsed_ms);
            return Err(ApiError::new(
                StatusCode::GATEWAY_TIMEOUT,
                "grading still in progress; submit again to read the final score",
            ));
        }
    };

    let message = if outcome.already_submitted {
        metrics::record_submit("idempotent", elapsed_ms);
        "Already submitted"
    } else {
        metrics::record_submit("finalized", elapsed_ms);
        info!(team_id = %team_id, score = outcome.score, elapsed_ms, "Team submitted");
        "Submitted successfully"
    };

    Ok(Json(SubmitResponse {
        message: message.to_string(),
        score: outcome.score,
    }))
}

/// GET /admin/teams/:team_id/submissions - full records with test results
pub async fn admin_submissions(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let submissions = state.service.submissions(&team_id).await?;
    Ok(Json(submissions))
}
