// Score events feeding the metrics registry

use arena_common::redis::SCORE_CHANNEL;
use arena_common::types::ScoreEvent;
use arena_grader::{LogNotifier, NotifyError, ScoreNotifier};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::metrics;

/// Notifier for the in-memory backend: logs and records the score directly
#[derive(Default)]
pub struct MetricsNotifier {
    log: LogNotifier,
}

#[async_trait]
impl ScoreNotifier for MetricsNotifier {
    async fn score_updated(&self, event: &ScoreEvent) -> Result<(), NotifyError> {
        metrics::record_final_score(event.score);
        self.log.score_updated(event).await
    }
}

/// Background task: subscribe to score events published by any API instance
pub async fn score_subscriber(redis_url: String) {
    let client = match redis::Client::open(redis_url.as_str()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create Redis client for score subscriber: {}", e);
            return;
        }
    };

    let mut pubsub = match client.get_async_connection().await {
        Ok(conn) => conn.into_pubsub(),
        Err(e) => {
            error!("Failed to create pubsub connection: {}", e);
            return;
        }
    };

    if let Err(e) = pubsub.subscribe(SCORE_CHANNEL).await {
        error!("Failed to subscribe to score channel: {}", e);
        return;
    }

    info!("Score subscriber started on {}", SCORE_CHANNEL);

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(_) => continue,
        };

        match serde_json::from_str::<ScoreEvent>(&payload) {
            Ok(event) => {
                metrics::record_final_score(event.score);
                debug!(team_id = %event.team_id, score = event.score, "Recorded final score");
            }
            Err(e) => warn!("Ignoring malformed score event: {}", e),
        }
    }

    warn!("Score subscriber stream ended");
}
