//! Job processing pipeline
//!
//! Ingestion stage plus conflict detection for one job: fetch the source
//! file, validate every record, rebuild the staging rows, upsert review
//! issues, and either hand the job to review or finalize it directly.
//!
//! Safe to repeat: staging rows and final contacts are cleared and rebuilt
//! inside one transaction, issues are upserted by key, and a COMPLETED job
//! is left untouched.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::queries;
use crate::types::{ContactData, JobStatus};

use super::conflicts::{self, ValidRow};
use super::finalize;
use super::storage::FileStore;
use super::validation;

/// Decode source file bytes as UTF-8, tolerating a leading byte-order mark.
fn decode_source(bytes: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Positions of the recognized columns within the header row. Unknown
/// columns are ignored; missing ones yield absent fields.
struct ColumnMap {
    email: Option<usize>,
    first_name: Option<usize>,
    last_name: Option<usize>,
    company: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        Self {
            email: find("email"),
            first_name: find("first_name"),
            last_name: find("last_name"),
            company: find("company"),
        }
    }

    fn extract(&self, record: &csv::StringRecord) -> ContactData {
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::to_string);

        ContactData {
            email: field(self.email),
            first_name: field(self.first_name),
            last_name: field(self.last_name),
            company: field(self.company),
        }
    }
}

/// Parse the decoded source into (row number, raw fields) pairs. The
/// header is line 1, so data rows number from 2.
fn read_contacts(text: &str) -> Result<Vec<(i32, ContactData)>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers);

    let mut records = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        let row_number = offset as i32 + 2;
        records.push((row_number, columns.extract(&record)));
    }

    Ok(records)
}

/// Run the full pipeline for one queued job.
///
/// Returns the resulting job status, or `None` when the job no longer
/// exists and the message should simply be dropped. Any error leaves the
/// database untouched past the last committed transaction; the caller is
/// responsible for marking the job FAILED.
pub async fn process_job(
    pool: &PgPool,
    store: &dyn FileStore,
    job_id: i64,
    file_key: &str,
) -> Result<Option<JobStatus>> {
    let mut conn = pool.acquire().await?;
    let Some(job) = queries::job::get_job(&mut conn, job_id).await? else {
        warn!("Job {} no longer exists, dropping message", job_id);
        return Ok(None);
    };

    if job.status == JobStatus::Completed {
        info!("Job {} already completed, redelivery is a no-op", job_id);
        return Ok(Some(JobStatus::Completed));
    }

    queries::job::mark_processing(&mut conn, job_id).await?;
    drop(conn);

    let bytes = store
        .get(file_key)
        .await
        .with_context(|| format!("fetching source file {file_key}"))?;
    let text = decode_source(&bytes).context("decoding source file as UTF-8")?;
    let records = read_contacts(text).context("parsing source CSV")?;

    let mut tx = pool.begin().await?;

    // Clear prior staging output so a redelivered message rebuilds from
    // scratch. Issues and their resolutions survive; human decisions are
    // not lost across retries.
    queries::row::delete_rows_for_job(&mut tx, job_id).await?;
    queries::contact::delete_contacts_for_job(&mut tx, job_id).await?;

    let mut total = 0i32;
    let mut valid = 0i32;
    let mut invalid = 0i32;
    let mut valid_rows: Vec<ValidRow> = Vec::new();

    for (row_number, raw) in records {
        total += 1;
        let outcome = validation::validate_row(raw);
        let row_id = queries::row::insert_row(
            &mut tx,
            job_id,
            row_number,
            &outcome.data,
            outcome.normalized_email.as_deref(),
            outcome.is_valid,
            &outcome.errors,
        )
        .await?;

        if outcome.is_valid {
            valid += 1;
            if let Some(email) = outcome.normalized_email {
                valid_rows.push(ValidRow {
                    row_id,
                    row_number,
                    email,
                    data: outcome.data,
                });
            }
        } else {
            invalid += 1;
        }
    }

    let conflicts = conflicts::find_conflicts(&valid_rows);
    let conflict_count = conflicts.len() as i32;
    for payload in &conflicts {
        queries::issue::upsert_duplicate_issue(&mut tx, job_id, &payload.email, payload).await?;
    }

    // Issues resolved before a reprocessing pass stay resolved, so the
    // open count can be lower than the current conflict count.
    let open_issues = queries::issue::count_open_issues(&mut tx, job_id).await?;
    let status = if open_issues > 0 {
        JobStatus::NeedsReview
    } else {
        JobStatus::Processing
    };
    queries::job::update_counts_and_status(
        &mut tx,
        job_id,
        total,
        valid,
        invalid,
        conflict_count,
        status,
    )
    .await?;
    tx.commit().await?;

    info!(
        "Job {} ingested: {} rows ({} valid, {} invalid), {} conflict(s), {} open issue(s)",
        job_id, total, valid, invalid, conflict_count, open_issues
    );

    if open_issues > 0 {
        return Ok(Some(JobStatus::NeedsReview));
    }

    finalize::finalize_job(pool, job_id).await?;
    Ok(Some(JobStatus::Completed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_source_strips_bom() {
        let bytes = "\u{feff}email\nann@x.com".as_bytes();
        assert_eq!(decode_source(bytes).unwrap(), "email\nann@x.com");
    }

    #[test]
    fn test_decode_source_rejects_invalid_utf8() {
        assert!(decode_source(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_read_contacts_numbers_rows_from_two() {
        let text = "email,first_name,last_name,company\n\
                    ann@x.com,Ann,A,Co1\n\
                    bob@x.com,Bob,B,Co2\n";
        let records = read_contacts(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 2);
        assert_eq!(records[1].0, 3);
        assert_eq!(records[0].1.email.as_deref(), Some("ann@x.com"));
        assert_eq!(records[1].1.company.as_deref(), Some("Co2"));
    }

    #[test]
    fn test_read_contacts_ignores_unknown_columns() {
        let text = "nickname,EMAIL,phone,company\nannie,ann@x.com,123,Co1\n";
        let records = read_contacts(text).unwrap();
        let data = &records[0].1;
        assert_eq!(data.email.as_deref(), Some("ann@x.com"));
        assert_eq!(data.company.as_deref(), Some("Co1"));
        assert_eq!(data.first_name, None);
        assert_eq!(data.last_name, None);
    }

    #[test]
    fn test_read_contacts_handles_missing_columns() {
        let text = "first_name\nAnn\n";
        let records = read_contacts(text).unwrap();
        let data = &records[0].1;
        assert_eq!(data.email, None);
        assert_eq!(data.first_name.as_deref(), Some("Ann"));
    }

    #[test]
    fn test_read_contacts_tolerates_short_rows() {
        let text = "email,first_name,last_name,company\nann@x.com,Ann\n";
        let records = read_contacts(text).unwrap();
        let data = &records[0].1;
        assert_eq!(data.email.as_deref(), Some("ann@x.com"));
        assert_eq!(data.last_name, None);
    }

    #[test]
    fn test_read_contacts_empty_file() {
        assert!(read_contacts("").unwrap().is_empty());
        assert!(read_contacts("email,first_name\n").unwrap().is_empty());
    }
}
