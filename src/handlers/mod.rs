//! NATS message handlers

pub mod issue;
pub mod job;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use sqlx::PgPool;
use tokio::select;
use tracing::{error, info};

use crate::services::job_processor::JobProcessor;
use crate::services::storage::FileStore;

/// Start all message handlers and the queue consumer
pub async fn start_handlers(
    client: Client,
    pool: PgPool,
    store: Arc<dyn FileStore>,
    processor: Arc<JobProcessor>,
) -> Result<()> {
    info!("Starting message handlers...");

    let ping_sub = client.subscribe("adresar.ping").await?;
    let job_submit_sub = client.subscribe("adresar.job.submit").await?;
    let job_get_sub = client.subscribe("adresar.job.get").await?;
    let job_finalize_sub = client.subscribe("adresar.job.finalize").await?;
    let issue_resolve_sub = client.subscribe("adresar.issue.resolve").await?;

    info!("Subscribed to NATS subjects");

    let ping_task = tokio::spawn(ping::handle(client.clone(), ping_sub));
    let submit_task = tokio::spawn(job::handle_submit(
        client.clone(),
        job_submit_sub,
        pool.clone(),
        store,
        processor.clone(),
    ));
    let get_task = tokio::spawn(job::handle_get(client.clone(), job_get_sub, pool.clone()));
    let finalize_task = tokio::spawn(job::handle_finalize(
        client.clone(),
        job_finalize_sub,
        pool.clone(),
        processor.clone(),
    ));
    let resolve_task = tokio::spawn(issue::handle_resolve(
        client.clone(),
        issue_resolve_sub,
        pool,
        processor.clone(),
    ));
    let worker_task = tokio::spawn(processor.start_processing());

    // Handlers run until the NATS connection drops; whichever exits first
    // takes the process down with it.
    select! {
        result = ping_task => error!("Ping handler exited: {:?}", result),
        result = submit_task => error!("Job submit handler exited: {:?}", result),
        result = get_task => error!("Job get handler exited: {:?}", result),
        result = finalize_task => error!("Job finalize handler exited: {:?}", result),
        result = resolve_task => error!("Issue resolve handler exited: {:?}", result),
        result = worker_task => error!("Job processor exited: {:?}", result),
    }

    Ok(())
}
