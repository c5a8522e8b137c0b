//! Issue resolution store
//!
//! Applies a human decision to an open issue: choose a candidate row, edit
//! a row's fields, or skip a row. The issue flips OPEN -> RESOLVED exactly
//! once; rejected requests mutate nothing. When the last open issue for a
//! job is resolved, the finalizer runs automatically.

use anyhow::Context;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::queries;
use crate::types::{IssueStatus, JobStatus, ResolutionAction};

use super::finalize::{self, FinalizeError};
use super::validation;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("issue {0} not found for this job")]
    IssueNotFound(i64),
    #[error("issue {0} is already resolved")]
    AlreadyResolved(i64),
    #[error("row {0} does not belong to this job")]
    RowNotInJob(i64),
    #[error("finalize after resolve failed: {0}")]
    Finalize(#[from] FinalizeError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ResolveError {
    /// Wire error code for the external boundary.
    pub fn code(&self) -> &'static str {
        match self {
            ResolveError::IssueNotFound(_) => "ISSUE_NOT_FOUND",
            ResolveError::AlreadyResolved(_) => "ALREADY_RESOLVED",
            ResolveError::RowNotInJob(_) => "ROW_NOT_IN_JOB",
            ResolveError::Finalize(e) => e.code(),
            ResolveError::Internal(_) => "DATABASE_ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOutcome {
    pub job_status: JobStatus,
    pub finalized: bool,
}

/// Resolve one issue, scoped to its owning job.
///
/// The issue row is locked for the duration of the transaction, so
/// concurrent resolve calls against the same issue serialize and the loser
/// is rejected with a conflict.
pub async fn resolve_issue(
    pool: &PgPool,
    job_id: i64,
    issue_id: i64,
    action: &ResolutionAction,
) -> Result<ResolveOutcome, ResolveError> {
    let mut tx = pool.begin().await.context("starting resolve transaction")?;

    let issue = queries::issue::get_issue_in_job_for_update(&mut tx, job_id, issue_id)
        .await?
        .ok_or(ResolveError::IssueNotFound(issue_id))?;
    if issue.status == IssueStatus::Resolved {
        return Err(ResolveError::AlreadyResolved(issue_id));
    }

    match action {
        ResolutionAction::Choose { chosen_row_id } => {
            // The chosen row becomes authoritative for the email; the row
            // itself is not mutated.
            queries::row::get_row_in_job(&mut tx, job_id, *chosen_row_id)
                .await?
                .ok_or(ResolveError::RowNotInJob(*chosen_row_id))?;
        }
        ResolutionAction::Edit { row_id, updated_data } => {
            let row = queries::row::get_row_in_job(&mut tx, job_id, *row_id)
                .await?
                .ok_or(ResolveError::RowNotInJob(*row_id))?;

            let mut data = row.data.0;
            updated_data.apply_to(&mut data);
            let normalized = validation::normalize_email(data.email.as_deref());
            data.email = normalized.clone();

            // The edit is trusted to cure the issue, so the row is forced
            // valid; an address that still fails the check is only logged.
            match normalized.as_deref() {
                Some(email) if !validation::is_valid_email_format(email) => {
                    warn!("Edited row {} email {:?} still fails the format check", row_id, email);
                }
                None => warn!("Edit removed the email from row {}", row_id),
                _ => {}
            }

            queries::row::apply_row_edit(&mut tx, *row_id, &data, normalized.as_deref()).await?;
        }
        ResolutionAction::Skip { row_id } => {
            if let Some(row_id) = row_id {
                queries::row::get_row_in_job(&mut tx, job_id, *row_id)
                    .await?
                    .ok_or(ResolveError::RowNotInJob(*row_id))?;
                queries::row::mark_row_skipped(&mut tx, *row_id).await?;
            }
        }
    }

    queries::issue::upsert_resolution(&mut tx, issue_id, action).await?;
    if !queries::issue::mark_resolved(&mut tx, issue_id).await? {
        return Err(ResolveError::AlreadyResolved(issue_id));
    }
    tx.commit().await.context("committing resolve transaction")?;

    info!("Issue {} for job {} resolved", issue_id, job_id);

    let mut conn = pool.acquire().await.context("acquiring connection")?;
    let open_issues = queries::issue::count_open_issues(&mut conn, job_id).await?;
    drop(conn);

    if open_issues > 0 {
        return Ok(ResolveOutcome {
            job_status: JobStatus::NeedsReview,
            finalized: false,
        });
    }

    let summary = finalize::finalize_job(pool, job_id).await?;
    info!(
        "Job {} auto-finalized after last resolution: {} contact(s)",
        job_id, summary.contact_count
    );
    Ok(ResolveOutcome {
        job_status: JobStatus::Completed,
        finalized: true,
    })
}
