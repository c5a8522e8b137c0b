//! Canonical contact output types

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One deduplicated contact per distinct normalized email within a job.
/// The whole set is regenerated on every finalize pass.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalContact {
    pub id: i64,
    pub job_id: i64,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
}
