//! Job types and status lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a stored enum column holds a value the worker does not know.
#[derive(Debug, Error)]
#[error("unknown enum value: {0}")]
pub struct ParseEnumError(pub String);

/// Job processing status.
///
/// PENDING -> PROCESSING -> { NEEDS_REVIEW | COMPLETED | FAILED }.
/// NEEDS_REVIEW advances to COMPLETED through the finalizer once every
/// issue is resolved. COMPLETED is terminal for reprocessing; FAILED jobs
/// may be retried from scratch by message redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    NeedsReview,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::NeedsReview => "NEEDS_REVIEW",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, ParseEnumError> {
        match value.as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "NEEDS_REVIEW" => Ok(JobStatus::NeedsReview),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(ParseEnumError(value)),
        }
    }
}

/// One user-submitted contact file and its processing lifecycle.
///
/// Counters and status are mutated only by the pipeline stages, never by
/// resolution calls directly.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub file_key: Option<String>,
    pub original_filename: Option<String>,
    pub total_rows: i32,
    pub valid_rows: i32,
    pub invalid_rows: i32,
    pub conflict_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::NeedsReview,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            let parsed = JobStatus::try_from(status.as_str().to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_rejects_unknown_value() {
        assert!(JobStatus::try_from("ARCHIVED".to_string()).is_err());
    }

    #[test]
    fn test_status_serializes_as_wire_enum() {
        let json = serde_json::to_string(&JobStatus::NeedsReview).unwrap();
        assert_eq!(json, "\"NEEDS_REVIEW\"");
    }
}
