//! Finalizer: build the canonical contact set for a job
//!
//! Runs once every issue is resolved, either from the pipeline (no
//! conflicts found) or after the last resolution, or on an explicit
//! trigger. Clear-then-rebuild inside one transaction makes repeated calls
//! yield identical output for unchanged inputs.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use sqlx::types::Json;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::db::queries;
use crate::types::{ContactData, JobStatus, ResolutionAction};

use super::conflicts::ValidRow;

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("job {0} not found")]
    JobNotFound(i64),
    #[error("{0} open issue(s) must be resolved before finalize")]
    OpenIssues(i64),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl FinalizeError {
    /// Wire error code for the external boundary.
    pub fn code(&self) -> &'static str {
        match self {
            FinalizeError::JobNotFound(_) => "JOB_NOT_FOUND",
            FinalizeError::OpenIssues(_) => "OPEN_ISSUES",
            FinalizeError::Internal(_) => "DATABASE_ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FinalizeSummary {
    pub contact_count: i64,
}

/// Pick one payload per distinct email, in ingestion order of first
/// appearance: an explicitly chosen row wins, otherwise the first valid
/// row for that email. A chosen row that has since been skipped or edited
/// away from the email falls back to the first valid row.
fn select_contacts(
    valid_rows: &[ValidRow],
    chosen: &HashMap<String, i64>,
) -> Vec<(String, ContactData)> {
    let by_id: HashMap<i64, &ValidRow> = valid_rows.iter().map(|r| (r.row_id, r)).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut contacts = Vec::new();
    for row in valid_rows {
        if !seen.insert(row.email.as_str()) {
            continue;
        }
        let data = chosen
            .get(&row.email)
            .and_then(|row_id| by_id.get(row_id))
            .map(|r| r.data.clone())
            .unwrap_or_else(|| row.data.clone());
        contacts.push((row.email.clone(), data));
    }

    contacts
}

/// Finalize a job: rebuild its canonical contacts and mark it COMPLETED.
/// Rejected while any issue for the job is still OPEN; nothing is written
/// in that case.
pub async fn finalize_job(pool: &PgPool, job_id: i64) -> Result<FinalizeSummary, FinalizeError> {
    let mut tx = pool
        .begin()
        .await
        .context("starting finalize transaction")?;

    queries::job::get_job(&mut tx, job_id)
        .await?
        .ok_or(FinalizeError::JobNotFound(job_id))?;

    let open_issues = queries::issue::count_open_issues(&mut tx, job_id).await?;
    if open_issues > 0 {
        return Err(FinalizeError::OpenIssues(open_issues));
    }

    queries::contact::delete_contacts_for_job(&mut tx, job_id).await?;

    // Chosen rows from resolved duplicate-email issues. Edit/skip
    // resolutions carry no choice; the surviving valid row wins by order.
    let mut chosen: HashMap<String, i64> = HashMap::new();
    for (email, Json(action)) in
        queries::issue::list_resolved_duplicate_resolutions(&mut tx, job_id).await?
    {
        if let ResolutionAction::Choose { chosen_row_id } = action {
            chosen.insert(email, chosen_row_id);
        }
    }

    let rows = queries::row::list_valid_rows(&mut tx, job_id).await?;
    let valid_rows: Vec<ValidRow> = rows
        .into_iter()
        .filter_map(|r| {
            Some(ValidRow {
                row_id: r.id,
                row_number: r.row_number,
                email: r.normalized_email?,
                data: r.data.0,
            })
        })
        .collect();

    let contacts = select_contacts(&valid_rows, &chosen);
    let contact_count = contacts.len() as i64;
    for (email, data) in &contacts {
        queries::contact::insert_contact(&mut tx, job_id, email, data).await?;
    }

    queries::job::set_status(&mut tx, job_id, JobStatus::Completed).await?;
    tx.commit()
        .await
        .context("committing finalize transaction")?;

    info!("Job {} finalized: {} contact(s)", job_id, contact_count);
    Ok(FinalizeSummary { contact_count })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, number: i32, email: &str, first: &str, company: &str) -> ValidRow {
        ValidRow {
            row_id: id,
            row_number: number,
            email: email.to_string(),
            data: ContactData {
                email: Some(email.to_string()),
                first_name: Some(first.to_string()),
                last_name: None,
                company: Some(company.to_string()),
            },
        }
    }

    #[test]
    fn test_first_valid_row_wins_without_resolution() {
        let rows = vec![
            row(1, 2, "ann@x.com", "Ann", "Co1"),
            row(2, 3, "ann@x.com", "Ann", "Co1"),
            row(3, 4, "bob@x.com", "Bob", "Co2"),
        ];
        let contacts = select_contacts(&rows, &HashMap::new());
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].0, "ann@x.com");
        assert_eq!(contacts[0].1.first_name.as_deref(), Some("Ann"));
        assert_eq!(contacts[1].0, "bob@x.com");
    }

    #[test]
    fn test_chosen_row_overrides_first() {
        let rows = vec![
            row(1, 2, "bob@x.com", "Bob", "Co1"),
            row(2, 3, "bob@x.com", "Robert", "Co2"),
        ];
        let chosen = HashMap::from([("bob@x.com".to_string(), 2)]);
        let contacts = select_contacts(&rows, &chosen);
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].1.first_name.as_deref(), Some("Robert"));
        assert_eq!(contacts[0].1.company.as_deref(), Some("Co2"));
    }

    #[test]
    fn test_stale_chosen_row_falls_back_to_first() {
        // Row 9 was chosen but is no longer among the valid rows.
        let rows = vec![
            row(1, 2, "bob@x.com", "Bob", "Co1"),
            row(2, 3, "bob@x.com", "Robert", "Co2"),
        ];
        let chosen = HashMap::from([("bob@x.com".to_string(), 9)]);
        let contacts = select_contacts(&rows, &chosen);
        assert_eq!(contacts[0].1.first_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let rows = vec![
            row(1, 2, "zed@x.com", "Zed", "Co1"),
            row(2, 3, "ann@x.com", "Ann", "Co2"),
            row(3, 4, "zed@x.com", "Zedd", "Co3"),
        ];
        let chosen = HashMap::from([("zed@x.com".to_string(), 3)]);
        let first = select_contacts(&rows, &chosen);
        let second = select_contacts(&rows, &chosen);
        assert_eq!(first, second);
        // Order follows first appearance in ingestion order.
        assert_eq!(first[0].0, "zed@x.com");
        assert_eq!(first[1].0, "ann@x.com");
    }

    #[test]
    fn test_empty_input_yields_no_contacts() {
        assert!(select_contacts(&[], &HashMap::new()).is_empty());
    }
}
