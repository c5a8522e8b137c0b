//! Row validation and identity comparison
//!
//! Pure functions shared by the ingestion pipeline and the resolution
//! store. Email normalization and format rules live here so both paths
//! agree on what a usable address is.

use crate::types::{ContactData, ValidationCode};

/// Identity signature: normalized (first name, last name, company).
/// Two rows sharing an email represent the same person iff their
/// signatures are equal.
pub type IdentitySignature = (String, String, String);

/// Outcome of validating one CSV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowOutcome {
    /// Payload with the normalized email substituted in.
    pub data: ContactData,
    pub normalized_email: Option<String>,
    pub is_valid: bool,
    pub errors: Vec<ValidationCode>,
}

/// Strip a single trailing parenthetical annotation, e.g.
/// `"addr@example.com (work)"` -> `"addr@example.com"`.
fn strip_annotation(value: &str) -> &str {
    if value.ends_with(')') {
        if let Some(open) = value.rfind('(') {
            if open > 0 {
                return value[..open].trim_end();
            }
        }
    }
    value
}

/// Normalize an email address: trim, drop one trailing `(...)` annotation,
/// lowercase. Empty and absent both normalize to `None`.
pub fn normalize_email(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    let stripped = strip_annotation(trimmed);
    let normalized = stripped.trim().to_lowercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Structural email check: exactly one `@`, non-empty local part, domain
/// with at least one dot and no empty labels, no separator characters.
pub fn is_valid_email_format(email: &str) -> bool {
    if email.is_empty() {
        return false;
    }
    if email.contains(';') || email.contains(',') || email.contains(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    if !domain.contains('.') {
        return false;
    }
    domain.split('.').all(|label| !label.is_empty())
}

/// Validate one record. All applicable failure codes are recorded, in rule
/// order; the row is valid iff none apply.
pub fn validate_row(raw: ContactData) -> RowOutcome {
    let normalized_email = normalize_email(raw.email.as_deref());

    let mut errors = Vec::new();
    match normalized_email.as_deref() {
        None => errors.push(ValidationCode::MissingEmail),
        Some(email) => {
            if !is_valid_email_format(email) {
                errors.push(ValidationCode::InvalidEmailFormat);
            }
        }
    }

    let data = ContactData {
        email: normalized_email.clone(),
        ..raw
    };

    RowOutcome {
        data,
        normalized_email,
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Compute the identity signature for a row's payload. Missing fields
/// contribute an empty string so rows differing only in absence vs. blank
/// compare equal.
pub fn identity_signature(data: &ContactData) -> IdentitySignature {
    fn norm(field: &Option<String>) -> String {
        field
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_lowercase()
    }

    (
        norm(&data.first_name),
        norm(&data.last_name),
        norm(&data.company),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(email: Option<&str>, first: &str, last: &str, company: &str) -> ContactData {
        ContactData {
            email: email.map(str::to_string),
            first_name: Some(first.to_string()),
            last_name: Some(last.to_string()),
            company: Some(company.to_string()),
        }
    }

    #[test]
    fn test_normalize_email() {
        let cases = [
            ("  JOHN@Example.COM  ", Some("john@example.com")),
            ("user@example.com (work)", Some("user@example.com")),
            ("", None),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                normalize_email(Some(raw)).as_deref(),
                expected,
                "input: {raw:?}"
            );
        }
        assert_eq!(normalize_email(None), None);
    }

    #[test]
    fn test_valid_email_formats() {
        for email in ["john@example.com", "jane.doe+tag@example.co.uk"] {
            assert!(is_valid_email_format(email), "should accept {email:?}");
        }
    }

    #[test]
    fn test_invalid_email_formats() {
        let cases = [
            "",
            "notanemail",
            "john@",
            "@example.com",
            "john@example",
            "john@example,com",
            "john@example.com;other@example.com",
            "john@example..com",
            "john@.example.com",
            "john@@example.com",
        ];
        for email in cases {
            assert!(!is_valid_email_format(email), "should reject {email:?}");
        }
    }

    #[test]
    fn test_validate_row_missing_email() {
        let outcome = validate_row(contact(None, "Ann", "B", "Co"));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec![ValidationCode::MissingEmail]);
        assert_eq!(outcome.normalized_email, None);

        let outcome = validate_row(contact(Some("   "), "Ann", "B", "Co"));
        assert_eq!(outcome.errors, vec![ValidationCode::MissingEmail]);
    }

    #[test]
    fn test_validate_row_bad_format() {
        let outcome = validate_row(contact(Some("nope"), "Ann", "B", "Co"));
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors, vec![ValidationCode::InvalidEmailFormat]);
        // The unparseable address is still recorded for review.
        assert_eq!(outcome.normalized_email.as_deref(), Some("nope"));
    }

    #[test]
    fn test_validate_row_normalizes_payload_email() {
        let outcome = validate_row(contact(Some(" Ann@X.COM (home)"), "Ann", "B", "Co"));
        assert!(outcome.is_valid);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.data.email.as_deref(), Some("ann@x.com"));
    }

    #[test]
    fn test_identity_signature_normalization() {
        let a = contact(Some("x@y.com"), " Alice ", "A", "Co1");
        let b = contact(Some("x@y.com"), "alice", "a", "CO1");
        assert_eq!(identity_signature(&a), identity_signature(&b));
    }

    #[test]
    fn test_identity_signature_missing_vs_blank() {
        let mut a = contact(Some("x@y.com"), "Bob", "B", "");
        a.company = None;
        let b = contact(Some("x@y.com"), "Bob", "B", "  ");
        assert_eq!(identity_signature(&a), identity_signature(&b));
    }

    #[test]
    fn test_identity_signature_differs_on_company() {
        let a = contact(Some("x@y.com"), "Bob", "B", "Co1");
        let b = contact(Some("x@y.com"), "Bob", "B", "Co2");
        assert_ne!(identity_signature(&a), identity_signature(&b));
    }
}
