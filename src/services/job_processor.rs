//! Job JetStream processor
//!
//! Wraps the processing pipeline with JetStream for:
//! - At-least-once delivery with explicit acks
//! - Redelivery of failed jobs after the ack wait
//! - Persistence across restarts
//!
//! ## Streams
//! - `ADRESAR_JOBS` - work queue of submitted contact-list jobs

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_nats::jetstream::{self, Context as JsContext};
use async_nats::Client;
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::db::queries;
use crate::types::{JobMessage, JobStatus, JobStatusUpdate};

use super::pipeline;
use super::storage::FileStore;

// Stream and consumer names
const STREAM_NAME: &str = "ADRESAR_JOBS";
const CONSUMER_NAME: &str = "contact_workers";
const SUBJECT: &str = "adresar.jobs.process";
const STATUS_PREFIX: &str = "adresar.job.status";

// Visibility window: an un-acked message is redelivered after this long.
const ACK_WAIT: Duration = Duration::from_secs(30);

// Stored error messages are bounded.
const MAX_ERROR_LEN: usize = 5000;

fn truncate_error(message: &str) -> String {
    if message.len() <= MAX_ERROR_LEN {
        return message.to_string();
    }
    let mut end = MAX_ERROR_LEN;
    while !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

/// Job processor with JetStream integration
pub struct JobProcessor {
    client: Client,
    js: JsContext,
    pool: PgPool,
    store: Arc<dyn FileStore>,
}

impl JobProcessor {
    /// Create a new job processor, initializing the JetStream work queue
    pub async fn new(client: Client, pool: PgPool, store: Arc<dyn FileStore>) -> Result<Self> {
        let js = jetstream::new(client.clone());

        let stream_config = jetstream::stream::Config {
            name: STREAM_NAME.to_string(),
            subjects: vec![SUBJECT.to_string()],
            max_messages: 10_000,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        js.get_or_create_stream(stream_config).await?;
        info!("JetStream job stream '{}' ready", STREAM_NAME);

        Ok(Self {
            client,
            js,
            pool,
            store,
        })
    }

    /// Queue a job for processing, after its source file is durably stored
    pub async fn submit_job(&self, job_id: i64, file_key: &str) -> Result<()> {
        let message = JobMessage {
            job_id,
            file_key: file_key.to_string(),
        };
        let payload = serde_json::to_vec(&message)?;
        self.js.publish(SUBJECT, payload.into()).await?.await?;

        info!("Job {} queued for processing ({})", job_id, file_key);
        self.publish_status(job_id, JobStatus::Pending).await?;
        Ok(())
    }

    /// Publish a job status update
    pub async fn publish_status(&self, job_id: i64, status: JobStatus) -> Result<()> {
        let update = JobStatusUpdate::new(job_id, status);
        let subject = format!("{}.{}", STATUS_PREFIX, job_id);
        let payload = serde_json::to_vec(&update)?;

        self.client.publish(subject, payload.into()).await?;
        Ok(())
    }

    /// Start processing jobs from the queue, one message at a time
    pub async fn start_processing(self: Arc<Self>) -> Result<()> {
        let stream = self.js.get_stream(STREAM_NAME).await?;

        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(CONSUMER_NAME.to_string()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait: ACK_WAIT,
            filter_subject: SUBJECT.to_string(),
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(CONSUMER_NAME, consumer_config)
            .await?;
        info!("JetStream job consumer '{}' ready", CONSUMER_NAME);

        let mut messages = consumer.messages().await?;

        while let Some(msg) = messages.next().await {
            match msg {
                Ok(msg) => {
                    if let Err(e) = self.handle_message(msg).await {
                        error!("Failed to handle job message: {:#}", e);
                    }
                }
                Err(e) => {
                    error!("Error receiving job message: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Process a single queued job message.
    ///
    /// The message is acked only after a clean pipeline run. On failure the
    /// job is marked FAILED (best effort) and the message is left un-acked
    /// for redelivery.
    async fn handle_message(&self, msg: jetstream::Message) -> Result<()> {
        let work: JobMessage = match serde_json::from_slice(&msg.payload) {
            Ok(work) => work,
            Err(e) => {
                // A malformed message never becomes processable; drop it.
                error!("Discarding unparseable job message: {}", e);
                if let Err(e) = msg.ack().await {
                    error!("Failed to ack malformed message: {:?}", e);
                }
                return Ok(());
            }
        };

        let start = Instant::now();
        info!("Processing job {} ({})", work.job_id, work.file_key);

        match pipeline::process_job(&self.pool, self.store.as_ref(), work.job_id, &work.file_key)
            .await
        {
            Ok(status) => {
                if let Some(status) = status {
                    if let Err(e) = self.publish_status(work.job_id, status).await {
                        warn!("Failed to publish status for job {}: {}", work.job_id, e);
                    }
                }

                if let Err(e) = msg.ack().await {
                    error!("Failed to ack job {}: {:?}", work.job_id, e);
                } else {
                    info!(
                        "Job {} processed in {}ms",
                        work.job_id,
                        start.elapsed().as_millis()
                    );
                }
            }
            Err(e) => {
                error!("Job {} failed: {:#}", work.job_id, e);

                let message = truncate_error(&format!("{:#}", e));
                match self.pool.acquire().await {
                    Ok(mut conn) => {
                        if let Err(e) =
                            queries::job::mark_failed(&mut conn, work.job_id, &message).await
                        {
                            error!("Failed to mark job {} as failed: {:#}", work.job_id, e);
                        }
                    }
                    Err(e) => error!("Could not acquire connection to mark job failed: {}", e),
                }
                let _ = self.publish_status(work.job_id, JobStatus::Failed).await;

                // No ack: the message stays on the stream and is
                // redelivered after ACK_WAIT.
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names() {
        assert_eq!(STREAM_NAME, "ADRESAR_JOBS");
        assert!(SUBJECT.starts_with("adresar.jobs"));
        assert!(STATUS_PREFIX.starts_with("adresar.job.status"));
    }

    #[test]
    fn test_truncate_error_short_message_unchanged() {
        assert_eq!(truncate_error("boom"), "boom");
    }

    #[test]
    fn test_truncate_error_bounds_long_message() {
        let long = "x".repeat(MAX_ERROR_LEN + 100);
        assert_eq!(truncate_error(&long).len(), MAX_ERROR_LEN);
    }

    #[test]
    fn test_truncate_error_respects_char_boundaries() {
        // 'ř' is two bytes; an odd byte limit must not split it.
        let long = "ř".repeat(MAX_ERROR_LEN);
        let truncated = truncate_error(&long);
        assert!(truncated.len() <= MAX_ERROR_LEN);
        assert!(truncated.chars().all(|c| c == 'ř'));
    }
}
