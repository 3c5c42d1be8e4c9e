//! Score notification sink.
//!
//! One event per successful finalize. Delivery is best-effort: the
//! submission service logs a failed notification and keeps the finalize.

use arena_common::redis::SCORE_CHANNEL;
use arena_common::types::ScoreEvent;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("redis publish failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to encode score event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait ScoreNotifier: Send + Sync {
    async fn score_updated(&self, event: &ScoreEvent) -> Result<(), NotifyError>;
}

/// Publishes events as JSON on the `arena:events:score` channel
#[derive(Clone)]
pub struct RedisNotifier {
    redis: ConnectionManager,
}

impl RedisNotifier {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl ScoreNotifier for RedisNotifier {
    async fn score_updated(&self, event: &ScoreEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.redis.clone();
        let _: () = conn.publish(SCORE_CHANNEL, payload).await?;
        Ok(())
    }
}

/// Logs events only; used by the CLI and single-node runs without Redis
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl ScoreNotifier for LogNotifier {
    async fn score_updated(&self, event: &ScoreEvent) -> Result<(), NotifyError> {
        info!(team_id = %event.team_id, score = event.score, "Score updated");
        Ok(())
    }
}
