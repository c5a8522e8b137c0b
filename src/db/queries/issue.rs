//! Issue and resolution database queries

use anyhow::Result;
use sqlx::types::Json;
use sqlx::PgConnection;

use crate::types::{Issue, IssuePayload, IssueStatus, IssueType, ResolutionAction};

const ISSUE_COLUMNS: &str =
    "id, job_id, issue_type, status, key, payload, created_at, updated_at";

/// Idempotent duplicate-email issue upsert, keyed (job, type, email).
///
/// A fresh conflict opens a new issue; a re-detected one only refreshes the
/// candidate snapshot. The status is deliberately left untouched so a
/// RESOLVED issue is never reopened by a later reprocessing pass.
pub async fn upsert_duplicate_issue(
    conn: &mut PgConnection,
    job_id: i64,
    email: &str,
    payload: &IssuePayload,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO issues (job_id, issue_type, status, key, payload, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        ON CONFLICT (job_id, issue_type, key)
        DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()
        "#,
    )
    .bind(job_id)
    .bind(IssueType::DuplicateEmail.as_str())
    .bind(IssueStatus::Open.as_str())
    .bind(email)
    .bind(Json(payload))
    .execute(conn)
    .await?;

    Ok(())
}

/// Count OPEN issues for a job
pub async fn count_open_issues(conn: &mut PgConnection, job_id: i64) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM issues WHERE job_id = $1 AND status = $2")
            .bind(job_id)
            .bind(IssueStatus::Open.as_str())
            .fetch_one(conn)
            .await?;

    Ok(count)
}

/// List every issue for a job, oldest first
pub async fn list_issues(conn: &mut PgConnection, job_id: i64) -> Result<Vec<Issue>> {
    let issues = sqlx::query_as::<_, Issue>(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issues WHERE job_id = $1 ORDER BY id ASC"
    ))
    .bind(job_id)
    .fetch_all(conn)
    .await?;

    Ok(issues)
}

/// Fetch an issue scoped to its job, row-locked for the resolve
/// read-modify-write.
pub async fn get_issue_in_job_for_update(
    conn: &mut PgConnection,
    job_id: i64,
    issue_id: i64,
) -> Result<Option<Issue>> {
    let issue = sqlx::query_as::<_, Issue>(&format!(
        "SELECT {ISSUE_COLUMNS} FROM issues WHERE id = $1 AND job_id = $2 FOR UPDATE"
    ))
    .bind(issue_id)
    .bind(job_id)
    .fetch_optional(conn)
    .await?;

    Ok(issue)
}

/// Upsert the resolution parameters for an issue (at most one per issue;
/// a second call before the status flips overwrites the previous record).
pub async fn upsert_resolution(
    conn: &mut PgConnection,
    issue_id: i64,
    resolution: &ResolutionAction,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO issue_resolutions (issue_id, resolution, created_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (issue_id)
        DO UPDATE SET resolution = EXCLUDED.resolution
        "#,
    )
    .bind(issue_id)
    .bind(Json(resolution))
    .execute(conn)
    .await?;

    Ok(())
}

/// Conditional OPEN -> RESOLVED transition. Returns false when the issue
/// was already resolved, which callers must treat as a conflict.
pub async fn mark_resolved(conn: &mut PgConnection, issue_id: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE issues SET status = $2, updated_at = NOW() WHERE id = $1 AND status = $3",
    )
    .bind(issue_id)
    .bind(IssueStatus::Resolved.as_str())
    .bind(IssueStatus::Open.as_str())
    .execute(conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Resolutions of RESOLVED duplicate-email issues, as (email, action)
/// pairs. The finalizer extracts chosen rows from these.
pub async fn list_resolved_duplicate_resolutions(
    conn: &mut PgConnection,
    job_id: i64,
) -> Result<Vec<(String, Json<ResolutionAction>)>> {
    let rows: Vec<(String, Json<ResolutionAction>)> = sqlx::query_as(
        r#"
        SELECT i.key, r.resolution
        FROM issues i
        JOIN issue_resolutions r ON r.issue_id = i.id
        WHERE i.job_id = $1 AND i.issue_type = $2 AND i.status = $3
        "#,
    )
    .bind(job_id)
    .bind(IssueType::DuplicateEmail.as_str())
    .bind(IssueStatus::Resolved.as_str())
    .fetch_all(conn)
    .await?;

    Ok(rows)
}
