//! Raw row database queries

use anyhow::Result;
use sqlx::types::Json;
use sqlx::PgConnection;

use crate::types::{ContactData, RawRow, ValidationCode};

const ROW_COLUMNS: &str =
    "id, job_id, row_number, data, normalized_email, is_valid, validation_errors";

/// Delete every staging row for a job (reprocessing support)
pub async fn delete_rows_for_job(conn: &mut PgConnection, job_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM raw_rows WHERE job_id = $1")
        .bind(job_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Insert one ingested row, returning its id
pub async fn insert_row(
    conn: &mut PgConnection,
    job_id: i64,
    row_number: i32,
    data: &ContactData,
    normalized_email: Option<&str>,
    is_valid: bool,
    errors: &[ValidationCode],
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO raw_rows (job_id, row_number, data, normalized_email, is_valid, validation_errors)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(job_id)
    .bind(row_number)
    .bind(Json(data))
    .bind(normalized_email)
    .bind(is_valid)
    .bind(Json(errors))
    .fetch_one(conn)
    .await?;

    Ok(id)
}

/// Fetch a row only if it belongs to the given job
pub async fn get_row_in_job(
    conn: &mut PgConnection,
    job_id: i64,
    row_id: i64,
) -> Result<Option<RawRow>> {
    let row = sqlx::query_as::<_, RawRow>(&format!(
        "SELECT {ROW_COLUMNS} FROM raw_rows WHERE id = $1 AND job_id = $2"
    ))
    .bind(row_id)
    .bind(job_id)
    .fetch_optional(conn)
    .await?;

    Ok(row)
}

/// List currently-valid rows with a usable email, in ingestion order
pub async fn list_valid_rows(conn: &mut PgConnection, job_id: i64) -> Result<Vec<RawRow>> {
    let rows = sqlx::query_as::<_, RawRow>(&format!(
        r#"
        SELECT {ROW_COLUMNS} FROM raw_rows
        WHERE job_id = $1 AND is_valid = TRUE AND normalized_email IS NOT NULL
        ORDER BY row_number ASC
        "#
    ))
    .bind(job_id)
    .fetch_all(conn)
    .await?;

    Ok(rows)
}

/// Rewrite a row's payload after an `edit` resolution. The edit is
/// asserted to cure the review condition, so the row is forced valid and
/// its failure codes are cleared.
pub async fn apply_row_edit(
    conn: &mut PgConnection,
    row_id: i64,
    data: &ContactData,
    normalized_email: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE raw_rows
        SET data = $2, normalized_email = $3, is_valid = TRUE,
            validation_errors = '[]'::jsonb
        WHERE id = $1
        "#,
    )
    .bind(row_id)
    .bind(Json(data))
    .bind(normalized_email)
    .execute(conn)
    .await?;

    Ok(())
}

/// Mark a row invalid after a `skip` resolution. The row is kept for audit
/// but excluded from finalization.
pub async fn mark_row_skipped(conn: &mut PgConnection, row_id: i64) -> Result<()> {
    sqlx::query("UPDATE raw_rows SET is_valid = FALSE WHERE id = $1")
        .bind(row_id)
        .execute(conn)
        .await?;

    Ok(())
}
