//! Final contact database queries

use anyhow::Result;
use sqlx::PgConnection;

use crate::types::{ContactData, FinalContact};

/// Delete the canonical contact set for a job (finalize idempotence)
pub async fn delete_contacts_for_job(conn: &mut PgConnection, job_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM final_contacts WHERE job_id = $1")
        .bind(job_id)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Insert one canonical contact
pub async fn insert_contact(
    conn: &mut PgConnection,
    job_id: i64,
    email: &str,
    data: &ContactData,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO final_contacts (job_id, email, first_name, last_name, company, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        "#,
    )
    .bind(job_id)
    .bind(email)
    .bind(&data.first_name)
    .bind(&data.last_name)
    .bind(&data.company)
    .execute(conn)
    .await?;

    Ok(())
}

/// List the canonical contacts for a job, in the order they were emitted
pub async fn list_contacts(conn: &mut PgConnection, job_id: i64) -> Result<Vec<FinalContact>> {
    let contacts = sqlx::query_as::<_, FinalContact>(
        r#"
        SELECT id, job_id, email, first_name, last_name, company, created_at
        FROM final_contacts
        WHERE job_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(conn)
    .await?;

    Ok(contacts)
}
