//! Job database queries

use anyhow::Result;
use sqlx::PgConnection;

use crate::types::{Job, JobStatus};

const JOB_COLUMNS: &str = "id, user_id, status, file_key, original_filename, \
     total_rows, valid_rows, invalid_rows, conflict_count, error_message, \
     created_at, updated_at";

/// Create a new job in PENDING state
pub async fn create_job(
    conn: &mut PgConnection,
    user_id: i64,
    original_filename: &str,
) -> Result<Job> {
    let job = sqlx::query_as::<_, Job>(&format!(
        r#"
        INSERT INTO jobs (user_id, status, original_filename, created_at, updated_at)
        VALUES ($1, $2, $3, NOW(), NOW())
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(JobStatus::Pending.as_str())
    .bind(original_filename)
    .fetch_one(conn)
    .await?;

    Ok(job)
}

/// Get job by ID
pub async fn get_job(conn: &mut PgConnection, job_id: i64) -> Result<Option<Job>> {
    let job = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
    ))
    .bind(job_id)
    .fetch_optional(conn)
    .await?;

    Ok(job)
}

/// Record the storage key of the uploaded source file
pub async fn set_file_key(conn: &mut PgConnection, job_id: i64, file_key: &str) -> Result<()> {
    sqlx::query("UPDATE jobs SET file_key = $2, updated_at = NOW() WHERE id = $1")
        .bind(job_id)
        .bind(file_key)
        .execute(conn)
        .await?;

    Ok(())
}

/// Transition a job to PROCESSING and clear any previous error message.
pub async fn mark_processing(conn: &mut PgConnection, job_id: i64) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = $2, error_message = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(JobStatus::Processing.as_str())
    .execute(conn)
    .await?;

    Ok(())
}

/// Store the ingestion counters together with the resulting status, as a
/// single atomic update.
pub async fn update_counts_and_status(
    conn: &mut PgConnection,
    job_id: i64,
    total: i32,
    valid: i32,
    invalid: i32,
    conflicts: i32,
    status: JobStatus,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET total_rows = $2, valid_rows = $3, invalid_rows = $4,
            conflict_count = $5, status = $6, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .bind(total)
    .bind(valid)
    .bind(invalid)
    .bind(conflicts)
    .bind(status.as_str())
    .execute(conn)
    .await?;

    Ok(())
}

/// Set job status
pub async fn set_status(conn: &mut PgConnection, job_id: i64, status: JobStatus) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(job_id)
        .bind(status.as_str())
        .execute(conn)
        .await?;

    Ok(())
}

/// Mark a job FAILED with a truncated error message. A COMPLETED job is
/// never demoted, so late failure reports from a redelivered message
/// cannot clobber finished work.
pub async fn mark_failed(conn: &mut PgConnection, job_id: i64, message: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = $2, error_message = $3, updated_at = NOW()
        WHERE id = $1 AND status <> $4
        "#,
    )
    .bind(job_id)
    .bind(JobStatus::Failed.as_str())
    .bind(message)
    .bind(JobStatus::Completed.as_str())
    .execute(conn)
    .await?;

    Ok(())
}
