//! Job message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::db::queries;
use crate::services::finalize;
use crate::services::job_processor::JobProcessor;
use crate::services::storage::FileStore;
use crate::types::{
    ErrorResponse, FinalizeResponse, JobDetailResponse, JobRef, JobStatus, Request,
    SubmitJobRequest, SuccessResponse,
};

// Enforced at the submission boundary; the pipeline itself is size-agnostic.
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Handle job.submit messages
///
/// Stores the uploaded CSV, creates a PENDING job and queues it for the
/// worker. Ownership of the submitted file is taken from the payload;
/// session verification happens upstream.
pub async fn handle_submit(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    store: Arc<dyn FileStore>,
    processor: Arc<JobProcessor>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received job.submit message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<SubmitJobRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse job.submit request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        let submit = &request.payload;

        if !submit.filename.to_lowercase().ends_with(".csv") {
            let error =
                ErrorResponse::new(request.id, "INVALID_REQUEST", "only CSV files are supported");
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        let bytes = match BASE64.decode(&submit.content) {
            Ok(bytes) => bytes,
            Err(e) => {
                let error = ErrorResponse::new(
                    request.id,
                    "INVALID_REQUEST",
                    format!("content is not valid base64: {e}"),
                );
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        if bytes.len() > MAX_UPLOAD_BYTES {
            let error = ErrorResponse::new(request.id, "INVALID_REQUEST", "file too large (max 5MB)");
            let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            continue;
        }

        match submit_job(&pool, store.as_ref(), &processor, submit, &bytes).await {
            Ok(job) => {
                let response = SuccessResponse::new(request.id, job);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
                debug!("Created job {}", response.payload.id);
            }
            Err(e) => {
                error!("Failed to submit job: {:#}", e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

async fn submit_job(
    pool: &PgPool,
    store: &dyn FileStore,
    processor: &JobProcessor,
    submit: &SubmitJobRequest,
    bytes: &[u8],
) -> Result<crate::types::Job> {
    let mut conn = pool.acquire().await?;
    let mut job = queries::job::create_job(&mut conn, submit.user_id, &submit.filename).await?;

    // Queue the message only once the file is durably stored.
    let file_key = format!("uploads/u{}/job-{}.csv", submit.user_id, job.id);
    store.put(&file_key, bytes).await?;
    queries::job::set_file_key(&mut conn, job.id, &file_key).await?;
    drop(conn);

    processor.submit_job(job.id, &file_key).await?;

    job.file_key = Some(file_key);
    Ok(job)
}

/// Handle job.get messages: counters, issues and (once completed) the
/// canonical contacts.
pub async fn handle_get(client: Client, mut subscriber: Subscriber, pool: PgPool) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received job.get message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<JobRef> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse job.get request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        let job_id = request.payload.job_id;

        match job_detail(&pool, job_id).await {
            Ok(Some(detail)) => {
                let response = SuccessResponse::new(request.id, detail);
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Ok(None) => {
                let error = ErrorResponse::new(
                    request.id,
                    "JOB_NOT_FOUND",
                    format!("job {job_id} not found"),
                );
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
            Err(e) => {
                error!("Failed to load job {}: {:#}", job_id, e);
                let error = ErrorResponse::new(request.id, "DATABASE_ERROR", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}

async fn job_detail(pool: &PgPool, job_id: i64) -> Result<Option<JobDetailResponse>> {
    let mut conn = pool.acquire().await?;
    let Some(job) = queries::job::get_job(&mut conn, job_id).await? else {
        return Ok(None);
    };
    let issues = queries::issue::list_issues(&mut conn, job_id).await?;
    let contacts = if job.status == JobStatus::Completed {
        queries::contact::list_contacts(&mut conn, job_id).await?
    } else {
        Vec::new()
    };

    Ok(Some(JobDetailResponse {
        job,
        issues,
        contacts,
    }))
}

/// Handle job.finalize messages: explicit finalize trigger, rejected while
/// any issue for the job remains open.
pub async fn handle_finalize(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    processor: Arc<JobProcessor>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received job.finalize message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<JobRef> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse job.finalize request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        let job_id = request.payload.job_id;

        match finalize::finalize_job(&pool, job_id).await {
            Ok(summary) => {
                if let Err(e) = processor.publish_status(job_id, JobStatus::Completed).await {
                    warn!("Failed to publish status for job {}: {}", job_id, e);
                }
                let response = SuccessResponse::new(
                    request.id,
                    FinalizeResponse {
                        job_id,
                        status: JobStatus::Completed,
                        contact_count: summary.contact_count,
                    },
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                warn!("Finalize rejected for job {}: {}", job_id, e);
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
