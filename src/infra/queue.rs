use anyhow::{anyhow, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_config::Region;
use aws_sdk_sqs::error::SdkError;
use aws_sdk_sqs::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;

/// Request to analyze one post, published by the upload workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationJob {
    pub post_id: Uuid,
    pub image_url: String,
}

#[derive(Clone)]
pub struct QueueClient {
    client: Client,
    queue_url: String,
}

#[derive(Debug)]
pub struct ReceivedJob {
    pub job: ModerationJob,
    pub receipt_handle: String,
}

impl QueueClient {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let region_provider = RegionProviderChain::first_try(Region::new(config.queue_region.clone()));
        let shared_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .load()
            .await;

        let mut sqs_builder = aws_sdk_sqs::config::Builder::from(&shared_config)
            .region(shared_config.region().cloned())
            .endpoint_url(config.queue_endpoint.clone());
        if let Some(provider) = shared_config.credentials_provider() {
            sqs_builder = sqs_builder.credentials_provider(provider);
        }
        let client = Client::from_conf(sqs_builder.build());

        let queue_url = match client
            .get_queue_url()
            .queue_name(&config.queue_name)
            .send()
            .await
        {
            Ok(response) => response
                .queue_url()
                .ok_or_else(|| anyhow!("missing queue url"))?
                .to_string(),
            Err(SdkError::ServiceError(service_err))
                if service_err.err().is_queue_does_not_exist() =>
            {
                let created = client
                    .create_queue()
                    .queue_name(&config.queue_name)
                    .send()
                    .await?;
                created
                    .queue_url()
                    .ok_or_else(|| anyhow!("missing queue url"))?
                    .to_string()
            }
            Err(err) => return Err(anyhow!(err)),
        };

        Ok(Self { client, queue_url })
    }

    pub async fn enqueue_moderation_job(&self, job: &ModerationJob) -> Result<()> {
        let body = serde_json::to_string(job)?;
        self.client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body)
            .send()
            .await?;

        debug!(post_id = %job.post_id, "moderation job enqueued");
        Ok(())
    }

    /// Long-poll for up to `max_messages` jobs. Unparseable messages are
    /// dropped from the queue.
    pub async fn receive_moderation_jobs(
        &self,
        max_messages: i32,
        wait_time_seconds: i32,
    ) -> Result<Vec<ReceivedJob>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.clamp(1, 10))
            .wait_time_seconds(wait_time_seconds)
            .send()
            .await?;

        let mut jobs = Vec::new();
        for message in response.messages() {
            let Some(receipt_handle) = message.receipt_handle().map(str::to_string) else {
                warn!("queue message missing receipt handle");
                continue;
            };

            let Some(body) = message.body() else {
                warn!("queue message missing body, deleting");
                let _ = self.delete_message(&receipt_handle).await;
                continue;
            };

            match serde_json::from_str::<ModerationJob>(body) {
                Ok(job) => {
                    debug!(post_id = %job.post_id, "received moderation job");
                    jobs.push(ReceivedJob { job, receipt_handle });
                }
                Err(err) => {
                    warn!(error = ?err, "failed to parse queue message body, deleting");
                    let _ = self.delete_message(&receipt_handle).await;
                }
            }
        }

        Ok(jobs)
    }

    pub async fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await?;

        Ok(())
    }
}
