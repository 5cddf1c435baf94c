use anyhow::Result;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::app::decision::DecisionEngine;
use crate::app::review_queue::invalidate_cached_stats;
use crate::infra::cache::RedisCache;
use crate::infra::queue::{ModerationJob, QueueClient};

const POLL_WAIT_SECONDS: i32 = 10;
const IDLE_SLEEP_MS: u64 = 200;
const ERROR_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    Completed,
    RetryLater,
}

pub async fn run(
    engine: DecisionEngine,
    queue: QueueClient,
    cache: RedisCache,
    batch_size: i32,
) -> Result<()> {
    info!(batch_size, "moderation worker started");
    loop {
        match queue.receive_moderation_jobs(batch_size, POLL_WAIT_SECONDS).await {
            Ok(messages) if messages.is_empty() => {
                tokio::time::sleep(Duration::from_millis(IDLE_SLEEP_MS)).await;
            }
            Ok(messages) => {
                let handles: Vec<_> = messages
                    .iter()
                    .map(|message| process_job(&engine, &cache, &message.job))
                    .collect();
                let outcomes = futures::future::join_all(handles).await;

                for (message, outcome) in messages.iter().zip(outcomes) {
                    if outcome == ProcessingOutcome::Completed {
                        if let Err(err) = queue.delete_message(&message.receipt_handle).await {
                            warn!(error = ?err, "failed to delete queue message");
                        }
                    }
                }
            }
            Err(err) => {
                warn!(error = ?err, "queue receive failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

/// Classifier failures are already folded into the outcome; only
/// infrastructure errors leave the job for redelivery.
pub async fn process_job(
    engine: &DecisionEngine,
    cache: &RedisCache,
    job: &ModerationJob,
) -> ProcessingOutcome {
    match engine.decide(job.post_id, &job.image_url).await {
        Ok(Some(_)) => {
            invalidate_cached_stats(cache).await;
            ProcessingOutcome::Completed
        }
        Ok(None) => ProcessingOutcome::Completed,
        Err(err) => {
            error!(
                error = ?err,
                post_id = %job.post_id,
                "failed to process moderation job"
            );
            ProcessingOutcome::RetryLater
        }
    }
}
