//! NATS message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contact::FinalContact;
use super::issue::{Issue, ResolutionAction};
use super::job::{Job, JobStatus};

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> Request<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Work queue message: one per submitted job, published after the source
/// file is durably stored. Field names are part of the producer contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: i64,
    pub file_key: String,
}

/// Payload for `adresar.job.submit`: CSV content plus ownership metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub user_id: i64,
    pub filename: String,
    /// Base64-encoded file bytes.
    pub content: String,
}

/// Payload for `adresar.job.get` and `adresar.job.finalize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRef {
    pub job_id: i64,
}

/// Payload for `adresar.issue.resolve`. The inner action object keeps the
/// external snake_case contract ({"action": "choose", "chosen_row_id": ...}).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveIssueRequest {
    pub job_id: i64,
    pub issue_id: i64,
    pub resolution: ResolutionAction,
}

/// Job detail: counters plus every issue with its candidate snapshot, and
/// the canonical contacts once the job is completed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDetailResponse {
    pub job: Job,
    pub issues: Vec<Issue>,
    pub contacts: Vec<FinalContact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub job_id: i64,
    pub status: JobStatus,
    pub contact_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveIssueResponse {
    pub issue_id: i64,
    pub job_status: JobStatus,
    pub finalized: bool,
}

/// Status update published on `adresar.job.status.<job_id>` after each
/// pipeline transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    pub job_id: i64,
    pub status: JobStatus,
    pub timestamp: DateTime<Utc>,
}

impl JobStatusUpdate {
    pub fn new(job_id: i64, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_message_wire_format() {
        let msg: JobMessage =
            serde_json::from_str(r#"{"job_id": 17, "file_key": "uploads/u1/job-17.csv"}"#).unwrap();
        assert_eq!(
            msg,
            JobMessage {
                job_id: 17,
                file_key: "uploads/u1/job-17.csv".to_string()
            }
        );

        // Round-trips with snake_case keys, per the producer contract.
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["job_id"], 17);
        assert_eq!(json["file_key"], "uploads/u1/job-17.csv");
    }

    #[test]
    fn test_resolve_request_mixed_casing() {
        let req: ResolveIssueRequest = serde_json::from_str(
            r#"{"jobId": 1, "issueId": 2, "resolution": {"action": "choose", "chosen_row_id": 3}}"#,
        )
        .unwrap();
        assert_eq!(req.job_id, 1);
        assert_eq!(req.issue_id, 2);
        assert_eq!(req.resolution, ResolutionAction::Choose { chosen_row_id: 3 });
    }
}
