//! Issue message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use sqlx::PgPool;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::services::job_processor::JobProcessor;
use crate::services::resolution;
use crate::types::{
    ErrorResponse, Request, ResolveIssueRequest, ResolveIssueResponse, SuccessResponse,
};

/// Handle issue.resolve messages
///
/// Invalid actions (unknown tag, missing parameters) are rejected at
/// deserialization; domain rejections come back with their specific code
/// and mutate nothing.
pub async fn handle_resolve(
    client: Client,
    mut subscriber: Subscriber,
    pool: PgPool,
    processor: Arc<JobProcessor>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received issue.resolve message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ResolveIssueRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse issue.resolve request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };
        let resolve = &request.payload;

        match resolution::resolve_issue(
            &pool,
            resolve.job_id,
            resolve.issue_id,
            &resolve.resolution,
        )
        .await
        {
            Ok(outcome) => {
                if let Err(e) = processor
                    .publish_status(resolve.job_id, outcome.job_status)
                    .await
                {
                    warn!("Failed to publish status for job {}: {}", resolve.job_id, e);
                }
                let response = SuccessResponse::new(
                    request.id,
                    ResolveIssueResponse {
                        issue_id: resolve.issue_id,
                        job_status: outcome.job_status,
                        finalized: outcome.finalized,
                    },
                );
                let _ = client
                    .publish(reply, serde_json::to_vec(&response)?.into())
                    .await;
            }
            Err(e) => {
                warn!(
                    "Resolve rejected for issue {} (job {}): {}",
                    resolve.issue_id, resolve.job_id, e
                );
                let error = ErrorResponse::new(request.id, e.code(), e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
            }
        }
    }

    Ok(())
}
