// Route definitions for the Arena API

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::{handlers, AppState};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/questions", get(handlers::list_questions))
        .route("/teams/:team_id", get(handlers::team_state))
        .route("/teams/:team_id/drafts", get(handlers::list_drafts))
        .route("/teams/:team_id/drafts/:question_id", put(handlers::save_draft))
        .route("/teams/:team_id/submit", post(handlers::submit))
        .route("/admin/teams/:team_id/submissions", get(handlers::admin_submissions))
}
