use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Sections are optional; an absent section and an empty one are the same cohort.
pub fn section_key(section: Option<&str>) -> &str {
    section.map(str::trim).unwrap_or("")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Scope {
    pub branch: String,
    pub section: Option<String>,
}

impl Scope {
    pub fn new(branch: impl Into<String>, section: Option<String>) -> Self {
        let section = section
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            branch: branch.into().trim().to_string(),
            section,
        }
    }

    pub fn contains(&self, branch: &str, section: Option<&str>) -> bool {
        self.branch == branch && section_key(self.section.as_deref()) == section_key(section)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.section {
            Some(section) => write!(f, "{} section {}", self.branch, section),
            None => write!(f, "{}", self.branch),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: i32,
    pub text: String,
    pub order: i32,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct Student {
    pub regd_no: String,
    pub name: String,
    pub dob: String,
    pub branch: String,
    pub section: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FacultyAssignment {
    pub serial_no: String,
    pub faculty_name: String,
    pub subject: String,
    pub department: String,
    pub branch: String,
    pub section: Option<String>,
}

/// A stored submission; `scores` keeps the raw encoded form ("7,8,9").
#[derive(Debug, Clone)]
pub struct SubmissionRecord {
    pub id: Uuid,
    pub student_id: String,
    pub branch: String,
    pub section: Option<String>,
    pub faculty_name: String,
    pub subject: String,
    pub department: String,
    pub scores: String,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub student_id: String,
    pub branch: String,
    pub section: Option<String>,
    pub faculty_name: String,
    pub subject: String,
    pub department: String,
    pub scores: Vec<u8>,
    pub comments: Option<String>,
}

/// Submission as shown to staff, with the student identifier stripped.
#[derive(Debug, Clone, Serialize)]
pub struct RawFeedback {
    pub id: Uuid,
    pub branch: String,
    pub section: Option<String>,
    pub faculty_name: String,
    pub subject: String,
    pub department: String,
    pub scores: String,
    pub comments: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&SubmissionRecord> for RawFeedback {
    fn from(record: &SubmissionRecord) -> Self {
        Self {
            id: record.id,
            branch: record.branch.clone(),
            section: record.section.clone(),
            faculty_name: record.faculty_name.clone(),
            subject: record.subject.clone(),
            department: record.department.clone(),
            scores: record.scores.clone(),
            comments: record.comments.clone(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingBand {
    Excellent,
    Good,
    Fair,
    Poor,
    Unrated,
}

impl RatingBand {
    pub fn from_average(avg: Option<f64>) -> Self {
        match avg {
            None => RatingBand::Unrated,
            Some(v) if v >= 8.0 => RatingBand::Excellent,
            Some(v) if v >= 6.0 => RatingBand::Good,
            Some(v) if v >= 4.0 => RatingBand::Fair,
            Some(_) => RatingBand::Poor,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RatingBand::Excellent => "excellent",
            RatingBand::Good => "good",
            RatingBand::Fair => "fair",
            RatingBand::Poor => "poor",
            RatingBand::Unrated => "unrated",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateRow {
    pub faculty_name: String,
    pub subject: String,
    pub department: String,
    pub response_count: usize,
    pub per_question_avg: Vec<Option<f64>>,
    pub overall_avg: Option<f64>,
    pub overall_pct: Option<f64>,
    pub band: RatingBand,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionSummary {
    pub index: usize,
    pub text: String,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeStatus {
    Ready,
    NoRoster,
    NoFeedback,
    NoMatchingFaculty,
}
