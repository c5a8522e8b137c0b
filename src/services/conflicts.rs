//! Duplicate-email conflict detection
//!
//! Groups valid rows by normalized email and flags every email backed by
//! more than one distinct identity signature. Pure: persistence of the
//! resulting issues happens in the pipeline.

use std::collections::{BTreeMap, HashSet};

use crate::types::{CandidateRow, ContactData, IssuePayload};

use super::validation::identity_signature;

/// A valid ingested row, as fed into conflict detection and finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRow {
    pub row_id: i64,
    pub row_number: i32,
    pub email: String,
    pub data: ContactData,
}

/// Find every email with conflicting identities among the given valid rows.
///
/// Results are ordered by email so repeated passes over the same input
/// produce identical issue payloads. Identical duplicate rows collapse to
/// one signature and do not conflict.
pub fn find_conflicts(rows: &[ValidRow]) -> Vec<IssuePayload> {
    let mut by_email: BTreeMap<&str, Vec<&ValidRow>> = BTreeMap::new();
    for row in rows {
        by_email.entry(row.email.as_str()).or_default().push(row);
    }

    let mut conflicts = Vec::new();
    for (email, group) in by_email {
        let signatures: HashSet<_> = group.iter().map(|r| identity_signature(&r.data)).collect();
        if signatures.len() <= 1 {
            continue;
        }

        let candidates = group
            .iter()
            .map(|r| CandidateRow {
                raw_row_id: r.row_id,
                row_number: r.row_number,
                data: r.data.clone(),
            })
            .collect();

        conflicts.push(IssuePayload {
            email: email.to_string(),
            candidates,
        });
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, number: i32, email: &str, first: &str, last: &str, company: &str) -> ValidRow {
        ValidRow {
            row_id: id,
            row_number: number,
            email: email.to_string(),
            data: ContactData {
                email: Some(email.to_string()),
                first_name: Some(first.to_string()),
                last_name: Some(last.to_string()),
                company: Some(company.to_string()),
            },
        }
    }

    #[test]
    fn test_identical_identity_is_not_a_conflict() {
        // Two byte-identical rows for alice collapse to one signature.
        let rows = vec![
            row(1, 2, "alice@x.com", "Alice", "A", "Co1"),
            row(2, 3, "alice@x.com", "Alice", "A", "Co1"),
        ];
        assert!(find_conflicts(&rows).is_empty());
    }

    #[test]
    fn test_differing_signature_is_a_conflict() {
        let rows = vec![
            row(1, 2, "bob@x.com", "Bob", "B", "Co1"),
            row(2, 3, "bob@x.com", "Robert", "B", "Co2"),
        ];
        let conflicts = find_conflicts(&rows);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].email, "bob@x.com");
        assert_eq!(conflicts[0].candidates.len(), 2);
        assert_eq!(conflicts[0].candidates[0].raw_row_id, 1);
        assert_eq!(conflicts[0].candidates[1].row_number, 3);
    }

    #[test]
    fn test_case_and_space_differences_compare_equal() {
        let rows = vec![
            row(1, 2, "carol@x.com", "Carol", "C", "ACME"),
            row(2, 3, "carol@x.com", "  carol ", "c", "acme"),
        ];
        assert!(find_conflicts(&rows).is_empty());
    }

    #[test]
    fn test_distinct_emails_never_conflict() {
        let rows = vec![
            row(1, 2, "a@x.com", "A", "A", "Co1"),
            row(2, 3, "b@x.com", "B", "B", "Co2"),
        ];
        assert!(find_conflicts(&rows).is_empty());
    }

    #[test]
    fn test_conflicts_are_ordered_by_email() {
        let rows = vec![
            row(1, 2, "zed@x.com", "Zed", "Z", "Co1"),
            row(2, 3, "zed@x.com", "Zedd", "Z", "Co2"),
            row(3, 4, "ann@x.com", "Ann", "A", "Co1"),
            row(4, 5, "ann@x.com", "Anne", "A", "Co2"),
        ];
        let conflicts = find_conflicts(&rows);
        let emails: Vec<_> = conflicts.iter().map(|c| c.email.as_str()).collect();
        assert_eq!(emails, vec!["ann@x.com", "zed@x.com"]);
    }

    #[test]
    fn test_repeated_detection_is_deterministic() {
        let rows = vec![
            row(1, 2, "bob@x.com", "Bob", "B", "Co1"),
            row(2, 3, "bob@x.com", "Robert", "B", "Co2"),
            row(3, 4, "bob@x.com", "Bobby", "B", "Co3"),
        ];
        assert_eq!(find_conflicts(&rows), find_conflicts(&rows));
    }
}
