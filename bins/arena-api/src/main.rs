mod events;
mod handlers;
mod metrics;
mod routes;

use anyhow::{bail, Context};
use arena_common::{Config, ContestConfig};
use arena_grader::{
    Grader, InMemoryStore, ProcessSandbox, RedisNotifier, RedisStore, ScoreNotifier,
    SubmissionService, SubmissionStore,
};
use axum::Router;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SubmissionService>,
    pub start_time: Arc<Instant>,
    pub submit_deadline: Duration,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new().merge(routes::routes()).with_state(state)
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Arena API booting...");

    metrics::init_metrics();
    info!("Metrics registry initialized");

    let config = Config::from_env();

    let contest_path = std::env::var("CONTEST_CONFIG_PATH")
        .unwrap_or_else(|_| "config/contest.json".to_string());
    let contest = ContestConfig::load_from_file(&contest_path)
        .with_context(|| format!("Failed to load contest configuration from {}", contest_path))?;
    info!(
        questions = contest.questions.len(),
        teams = contest.teams.len(),
        max_score = contest.max_score(),
        "Loaded contest configuration"
    );

    let backend = std::env::var("STORE_BACKEND").unwrap_or_else(|_| "redis".to_string());
    let (store, notifier): (Arc<dyn SubmissionStore>, Arc<dyn ScoreNotifier>) =
        match backend.as_str() {
            "redis" => {
                let client = redis::Client::open(config.redis_url.as_str())
                    .context("Failed to create Redis client")?;
                let redis_conn = ConnectionManager::new(client)
                    .await
                    .context("Failed to connect to Redis")?;
                info!("Connected to Redis: {}", config.redis_url);

                tokio::spawn(events::score_subscriber(config.redis_url.clone()));

                (
                    Arc::new(RedisStore::new(redis_conn.clone())),
                    Arc::new(RedisNotifier::new(redis_conn)),
                )
            }
            "memory" => {
                info!("Using in-memory store; state is lost on restart");
                (
                    Arc::new(InMemoryStore::new()),
                    Arc::new(events::MetricsNotifier::default()),
                )
            }
            other => bail!("Unknown STORE_BACKEND '{}' (expected redis or memory)", other),
        };

    for team_id in &contest.teams {
        store
            .register_team(team_id)
            .await
            .with_context(|| format!("Failed to register team {}", team_id))?;
    }

    let sandbox = Arc::new(ProcessSandbox::new(&config));
    info!(
        max_concurrent = config.max_concurrent_executions,
        compile_timeout_ms = config.compile_timeout_ms,
        run_timeout_ms = config.run_timeout_ms,
        "Sandbox pool ready"
    );

    let grader = Grader::new(sandbox, store.clone(), Arc::new(contest), &config);
    let service = SubmissionService::new(store, grader, notifier, &config);

    let state = Arc::new(AppState {
        service: Arc::new(service),
        start_time: Arc::new(Instant::now()),
        submit_deadline: config.submit_deadline(),
    });

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::types::{ExecutionResult, Question, QuestionKind, TestCase};
    use arena_grader::Sandbox;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn mcq(id: &str, section: u32, order: u32, marks: u32, answer: &str) -> Question {
        Question {
            question_id: id.to_string(),
            kind: QuestionKind::Mcq,
            section,
            order,
            question_text: format!("Question {}", id),
            marks,
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_answer: Some(answer.to_string()),
            starter_code: String::new(),
            test_cases: vec![],
        }
    }

    /// Echoes stdin after a fixed delay
    struct SlowSandbox {
        delay: Duration,
    }

    #[async_trait]
    impl Sandbox for SlowSandbox {
        async fn execute(&self, _source_code: &str, stdin: &str) -> ExecutionResult {
            tokio::time::sleep(self.delay).await;
            ExecutionResult::succeeded(stdin.to_string(), self.delay.as_millis() as u64)
        }
    }

    async fn test_app() -> Router {
        let config = Config::default();
        let sandbox = Arc::new(ProcessSandbox::new(&config));
        let questions = vec![mcq("q2", 1, 1, 3, "C"), mcq("q1", 0, 0, 2, "B")];
        app_with(sandbox, questions, Duration::from_secs(5)).await
    }

    async fn app_with(sandbox: Arc<dyn Sandbox>, questions: Vec<Question>, submit_deadline: Duration) -> Router {
        let config = Config::default();
        let contest = ContestConfig {
            questions,
            teams: vec!["alpha".into()],
        };
        let store: Arc<dyn SubmissionStore> = Arc::new(InMemoryStore::with_teams(["alpha"]).await);
        let grader = Grader::new(sandbox, store.clone(), Arc::new(contest), &config);
        let service = SubmissionService::new(
            store,
            grader,
            Arc::new(events::MetricsNotifier::default()),
            &config,
        );
        app(Arc::new(AppState {
            service: Arc::new(service),
            start_time: Arc::new(Instant::now()),
            submit_deadline,
        }))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_questions_are_sanitized_and_ordered() {
        let app = test_app().await;
        let (status, body) = send(&app, "GET", "/questions", None).await;

        assert_eq!(status, StatusCode::OK);
        let list = body.as_array().unwrap();
        assert_eq!(list[0]["question_id"], "q1");
        assert_eq!(list[1]["question_id"], "q2");
        assert!(list[0].get("correct_answer").is_none());
        assert!(list[0].get("test_cases").is_none());
        assert_eq!(list[0]["test_cases_count"], 0);
    }

    #[tokio::test]
    async fn test_draft_submit_flow() {
        let app = test_app().await;

        let (status, _) = send(
            &app,
            "PUT",
            "/teams/alpha/drafts/q1",
            Some(json!({ "selected_option": "B" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, drafts) = send(&app, "GET", "/teams/alpha/drafts", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(drafts["q1"]["selected_option"], "B");
        assert_eq!(drafts["q1"]["evaluated"], false);

        let (status, body) = send(&app, "POST", "/teams/alpha/submit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score"], 2);
        assert_eq!(body["message"], "Submitted successfully");

        let (status, body) = send(&app, "POST", "/teams/alpha/submit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["score"], 2);
        assert_eq!(body["message"], "Already submitted");

        let (_, team) = send(&app, "GET", "/teams/alpha", None).await;
        assert_eq!(team["submitted"], true);
        assert_eq!(team["state"], "finalized");

        let (status, _) = send(
            &app,
            "PUT",
            "/teams/alpha/drafts/q2",
            Some(json!({ "selected_option": "C" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, subs) = send(&app, "GET", "/admin/teams/alpha/submissions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(subs.as_array().unwrap().len(), 2);
        assert_eq!(subs[0]["output"], "B");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_not_found() {
        let app = test_app().await;

        let (status, body) = send(&app, "POST", "/teams/ghost/submit", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));

        let (status, _) = send(
            &app,
            "PUT",
            "/teams/alpha/drafts/nope",
            Some(json!({ "code": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/teams/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submit_past_deadline_keeps_grading() {
        let sandbox = Arc::new(SlowSandbox {
            delay: Duration::from_millis(300),
        });
        let code = Question {
            question_id: "c1".into(),
            kind: QuestionKind::Code,
            section: 0,
            order: 0,
            question_text: "Echo".into(),
            marks: 5,
            options: vec![],
            correct_answer: None,
            starter_code: String::new(),
            test_cases: vec![TestCase::new("x", "x")],
        };
        let app = app_with(sandbox, vec![code], Duration::from_millis(50)).await;
        let (status, _) = send(
            &app,
            "PUT",
            "/teams/alpha/drafts/c1",
            Some(json!({ "code": "echo" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", "/teams/alpha/submit", None).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].as_str().unwrap().contains("in progress"));

        // the spawned grading task finishes on its own
        tokio::time::sleep(Duration::from_millis(600)).await;

        let (status, body) = send(&app, "POST", "/teams/alpha/submit", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Already submitted");
        assert_eq!(body["score"], 5);
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
