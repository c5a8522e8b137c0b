//! Review issue types and resolution actions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use super::job::ParseEnumError;
use super::row::{ContactData, ContactUpdate};

/// Issue taxonomy. Only duplicate-email conflicts are produced today, but
/// the stored string column leaves room for future variants (missing-field,
/// malformed-format, conflicting-company).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    DuplicateEmail,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::DuplicateEmail => "DUPLICATE_EMAIL",
        }
    }
}

impl TryFrom<String> for IssueType {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, ParseEnumError> {
        match value.as_str() {
            "DUPLICATE_EMAIL" => Ok(IssueType::DuplicateEmail),
            _ => Err(ParseEnumError(value)),
        }
    }
}

/// Issue lifecycle. OPEN -> RESOLVED is terminal; nothing reopens an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    Open,
    Resolved,
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "OPEN",
            IssueStatus::Resolved => "RESOLVED",
        }
    }
}

impl TryFrom<String> for IssueStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, ParseEnumError> {
        match value.as_str() {
            "OPEN" => Ok(IssueStatus::Open),
            "RESOLVED" => Ok(IssueStatus::Resolved),
            _ => Err(ParseEnumError(value)),
        }
    }
}

/// Snapshot of one contributing row, taken at detection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub raw_row_id: i64,
    pub row_number: i32,
    pub data: ContactData,
}

/// Issue payload: the conflicting email and every candidate row snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePayload {
    pub email: String,
    pub candidates: Vec<CandidateRow>,
}

/// A detected condition requiring human resolution, keyed by the normalized
/// email that triggered it. At most one issue exists per
/// (job, type, key); detection re-runs refresh the payload only.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: i64,
    pub job_id: i64,
    #[sqlx(try_from = "String")]
    pub issue_type: IssueType,
    #[sqlx(try_from = "String")]
    pub status: IssueStatus,
    pub key: String,
    pub payload: Json<IssuePayload>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Human resolution of an issue. The tag carries the action name, and each
/// variant declares exactly the parameters that action requires, so a
/// request with the wrong fields fails at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Keep one candidate row as authoritative for the email.
    Choose { chosen_row_id: i64 },
    /// Correct a row's fields; the edit is asserted to cure the issue.
    Edit {
        row_id: i64,
        updated_data: ContactUpdate,
    },
    /// Drop a row (or the whole conflict) from the final output.
    Skip {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_id: Option<i64>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_action_wire_format() {
        let action: ResolutionAction =
            serde_json::from_str(r#"{"action": "choose", "chosen_row_id": 42}"#).unwrap();
        assert_eq!(action, ResolutionAction::Choose { chosen_row_id: 42 });
    }

    #[test]
    fn test_edit_action_wire_format() {
        let action: ResolutionAction = serde_json::from_str(
            r#"{"action": "edit", "row_id": 7, "updated_data": {"email": "fixed@example.com"}}"#,
        )
        .unwrap();
        match action {
            ResolutionAction::Edit { row_id, updated_data } => {
                assert_eq!(row_id, 7);
                assert_eq!(updated_data.email.as_deref(), Some("fixed@example.com"));
                assert_eq!(updated_data.company, None);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_skip_action_row_id_is_optional() {
        let action: ResolutionAction = serde_json::from_str(r#"{"action": "skip"}"#).unwrap();
        assert_eq!(action, ResolutionAction::Skip { row_id: None });

        let action: ResolutionAction =
            serde_json::from_str(r#"{"action": "skip", "row_id": 3}"#).unwrap();
        assert_eq!(action, ResolutionAction::Skip { row_id: Some(3) });
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let result: Result<ResolutionAction, _> =
            serde_json::from_str(r#"{"action": "merge", "row_id": 1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_choose_requires_chosen_row_id() {
        let result: Result<ResolutionAction, _> = serde_json::from_str(r#"{"action": "choose"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_issue_type_round_trip() {
        let parsed = IssueType::try_from("DUPLICATE_EMAIL".to_string()).unwrap();
        assert_eq!(parsed.as_str(), "DUPLICATE_EMAIL");
        assert!(IssueType::try_from("CONFLICTING_COMPANY".to_string()).is_err());
    }
}
