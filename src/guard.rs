use uuid::Uuid;

use crate::models::{section_key, NewSubmission, SubmissionRecord};

/// Identity of a submission for the once-per-student rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionKey {
    pub student_id: String,
    pub branch: String,
    pub section: String,
    pub faculty_name: String,
    pub subject: String,
}

impl SubmissionKey {
    pub fn new(
        student_id: &str,
        branch: &str,
        section: Option<&str>,
        faculty_name: &str,
        subject: &str,
    ) -> Self {
        Self {
            student_id: student_id.to_string(),
            branch: branch.to_string(),
            section: section_key(section).to_string(),
            faculty_name: faculty_name.to_string(),
            subject: subject.to_string(),
        }
    }
}

impl From<&NewSubmission> for SubmissionKey {
    fn from(s: &NewSubmission) -> Self {
        Self::new(
            &s.student_id,
            &s.branch,
            s.section.as_deref(),
            &s.faculty_name,
            &s.subject,
        )
    }
}

impl From<&SubmissionRecord> for SubmissionKey {
    fn from(s: &SubmissionRecord) -> Self {
        Self::new(
            &s.student_id,
            &s.branch,
            s.section.as_deref(),
            &s.faculty_name,
            &s.subject,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted(Uuid),
    AlreadySubmitted,
}

/// Advisory pre-check. The store's unique constraint is what actually
/// decides; this only drives what the student is shown.
pub fn already_submitted(existing: &[SubmissionKey], candidate: &SubmissionKey) -> bool {
    existing.iter().any(|key| key == candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(subject: &str, section: Option<&str>) -> SubmissionKey {
        SubmissionKey::new("S001", "II-CSD", section, "Dr. A", subject)
    }

    #[test]
    fn same_key_is_rejected() {
        let existing = vec![key("DBMS", Some(""))];
        assert!(already_submitted(&existing, &key("DBMS", None)));
    }

    #[test]
    fn different_subject_is_accepted() {
        let existing = vec![key("DBMS", None)];
        assert!(!already_submitted(&existing, &key("OS", None)));
    }

    #[test]
    fn sections_must_match_when_present() {
        let existing = vec![key("DBMS", Some("A"))];
        assert!(already_submitted(&existing, &key("DBMS", Some("A"))));
        assert!(!already_submitted(&existing, &key("DBMS", Some("B"))));
        assert!(!already_submitted(&existing, &key("DBMS", None)));
    }

    #[test]
    fn key_from_new_submission_normalizes_section() {
        let submission = NewSubmission {
            student_id: "S001".to_string(),
            branch: "II-CSD".to_string(),
            section: None,
            faculty_name: "Dr. A".to_string(),
            subject: "DBMS".to_string(),
            department: "CSE".to_string(),
            scores: vec![7, 8],
            comments: None,
        };
        assert_eq!(SubmissionKey::from(&submission), key("DBMS", Some("")));
    }
}
