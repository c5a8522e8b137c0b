//! Staging row types for ingested CSV records

use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Normalized contact fields as stored in the row payload.
///
/// `email` holds the normalized address (trimmed, annotation stripped,
/// lowercased); the raw source value is not retained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactData {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
}

/// Per-row validation failure codes. Non-exclusive; a row is valid iff it
/// carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    MissingEmail,
    InvalidEmailFormat,
}

/// One record from the uploaded CSV, header excluded.
///
/// `row_number` is the 1-based position in the source file, so data starts
/// at 2. Rows are bulk-created during ingestion and mutated in place only
/// by edit/skip resolutions.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub id: i64,
    pub job_id: i64,
    pub row_number: i32,
    pub data: Json<ContactData>,
    pub normalized_email: Option<String>,
    pub is_valid: bool,
    pub validation_errors: Json<Vec<ValidationCode>>,
}

/// Partial field update supplied by an `edit` resolution.
///
/// Wire field names follow the external resolution contract (snake_case).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl ContactUpdate {
    /// Apply the update onto an existing payload. Each supplied field is
    /// trimmed; an empty trimmed value unsets the field.
    pub fn apply_to(&self, data: &mut ContactData) {
        fn merge(target: &mut Option<String>, update: &Option<String>) {
            if let Some(value) = update {
                let trimmed = value.trim();
                *target = if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                };
            }
        }

        merge(&mut data.email, &self.email);
        merge(&mut data.first_name, &self.first_name);
        merge(&mut data.last_name, &self.last_name);
        merge(&mut data.company, &self.company);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_code_wire_format() {
        let json = serde_json::to_string(&vec![
            ValidationCode::MissingEmail,
            ValidationCode::InvalidEmailFormat,
        ])
        .unwrap();
        assert_eq!(json, "[\"missing_email\",\"invalid_email_format\"]");
    }

    #[test]
    fn test_update_trims_and_unsets() {
        let mut data = ContactData {
            email: Some("old@example.com".to_string()),
            first_name: Some("Alice".to_string()),
            last_name: Some("A".to_string()),
            company: Some("Co1".to_string()),
        };

        let update = ContactUpdate {
            email: Some("  new@example.com ".to_string()),
            first_name: Some("   ".to_string()),
            ..Default::default()
        };
        update.apply_to(&mut data);

        assert_eq!(data.email.as_deref(), Some("new@example.com"));
        assert_eq!(data.first_name, None);
        // Untouched fields stay as they were.
        assert_eq!(data.last_name.as_deref(), Some("A"));
        assert_eq!(data.company.as_deref(), Some("Co1"));
    }
}
