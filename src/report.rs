use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate;
use crate::models::{
    AggregateRow, FacultyAssignment, Question, QuestionSummary, RawFeedback, Scope, ScopeStatus,
    SubmissionRecord,
};
use crate::roster::ReferenceSnapshot;
use crate::scores::question_labels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum View {
    Summary,
    Questions,
    Ranking,
    Matrix,
    Raw,
    All,
}

impl View {
    fn includes(self, other: View) -> bool {
        self == View::All || self == other
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeReport {
    pub scope: Scope,
    pub status: ScopeStatus,
    pub generated_at: DateTime<Utc>,
    pub roster_version: u64,
    pub roster_loaded_at: DateTime<Utc>,
    pub roster: Vec<FacultyAssignment>,
    pub questions: Vec<QuestionSummary>,
    pub faculty: Vec<AggregateRow>,
    pub top: Vec<AggregateRow>,
    pub bottom: Vec<AggregateRow>,
    pub matrix: Vec<Vec<Option<f64>>>,
    pub raw: Vec<RawFeedback>,
}

/// Runs the aggregation for one cohort and packages every view of it.
pub fn build_scope_report(
    scope: &Scope,
    snapshot: &ReferenceSnapshot,
    questions: &[Question],
    submissions: &[SubmissionRecord],
    top_n: usize,
) -> ScopeReport {
    let roster = snapshot.faculty_for(scope);
    let faculty = aggregate::aggregate_scope(scope, questions, &roster, submissions);

    let status = if roster.is_empty() {
        ScopeStatus::NoRoster
    } else if submissions.is_empty() {
        ScopeStatus::NoFeedback
    } else if faculty.is_empty() {
        ScopeStatus::NoMatchingFaculty
    } else {
        ScopeStatus::Ready
    };

    let (top, bottom) = aggregate::rank(&faculty, top_n);

    ScopeReport {
        scope: scope.clone(),
        status,
        generated_at: Utc::now(),
        roster_version: snapshot.version,
        roster_loaded_at: snapshot.loaded_at,
        questions: aggregate::question_summaries(questions, &faculty),
        matrix: aggregate::rating_matrix(&faculty),
        raw: submissions.iter().map(RawFeedback::from).collect(),
        roster,
        faculty,
        top,
        bottom,
    }
}

fn fmt_value(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "-".to_string(),
    }
}

fn empty_state(status: ScopeStatus) -> Option<&'static str> {
    match status {
        ScopeStatus::Ready => None,
        ScopeStatus::NoRoster => Some("No faculty roster is loaded for this branch/section."),
        ScopeStatus::NoFeedback => Some("No feedback submitted yet for this branch/section."),
        ScopeStatus::NoMatchingFaculty => {
            Some("No feedback entries match the listed faculty.")
        }
    }
}

fn write_rows(output: &mut String, rows: &[AggregateRow]) {
    for row in rows {
        let _ = writeln!(
            output,
            "- {} ({}, {}) avg {} / 10, {}% [{}] across {} responses",
            row.faculty_name,
            row.subject,
            row.department,
            fmt_value(row.overall_avg, 2),
            fmt_value(row.overall_pct, 1),
            row.band.label(),
            row.response_count
        );
    }
}

pub fn render_markdown(report: &ScopeReport, view: View) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Faculty Feedback Report");
    let _ = writeln!(
        output,
        "Generated for {} at {} (roster version {:016x}, loaded {})",
        report.scope,
        report.generated_at.format("%Y-%m-%d %H:%M UTC"),
        report.roster_version,
        report.roster_loaded_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);

    if !report.roster.is_empty() {
        let _ = writeln!(output, "## Faculty in this Branch & Section");
        for entry in &report.roster {
            let _ = writeln!(
                output,
                "- {}. {} ({}, {})",
                entry.serial_no, entry.faculty_name, entry.subject, entry.department
            );
        }
        let _ = writeln!(output);
    }

    if let Some(message) = empty_state(report.status) {
        let _ = writeln!(output, "{message}");
        return output;
    }

    let labels = question_labels(report.questions.len());

    if view.includes(View::Summary) {
        let _ = writeln!(output, "## Faculty-wise Summary");
        let _ = writeln!(
            output,
            "| Faculty | Subject | Department | Responses | {} | Overall Avg | Overall % | Rating |",
            labels.join(" | ")
        );
        let _ = writeln!(output, "|{}", "---|".repeat(labels.len() + 7));
        for row in &report.faculty {
            let per_question: Vec<String> = row
                .per_question_avg
                .iter()
                .map(|v| fmt_value(*v, 2))
                .collect();
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} | {} |",
                row.faculty_name,
                row.subject,
                row.department,
                row.response_count,
                per_question.join(" | "),
                fmt_value(row.overall_avg, 2),
                fmt_value(row.overall_pct, 1),
                row.band.label()
            );
        }
        let _ = writeln!(output);
    }

    if view.includes(View::Questions) {
        let _ = writeln!(output, "## Question-wise Average (Section Level)");
        for summary in &report.questions {
            let _ = writeln!(
                output,
                "- Q{} {}: {}",
                summary.index,
                summary.text,
                fmt_value(summary.average, 2)
            );
        }
        let _ = writeln!(output);
    }

    if view.includes(View::Ranking) {
        let _ = writeln!(output, "## Top {} Faculty", report.top.len());
        write_rows(&mut output, &report.top);
        let _ = writeln!(output);
        let _ = writeln!(output, "## Bottom {} Faculty", report.bottom.len());
        write_rows(&mut output, &report.bottom);
        let _ = writeln!(output);
    }

    if view.includes(View::Matrix) {
        let _ = writeln!(output, "## Faculty x Question Matrix");
        let _ = writeln!(output, "| Faculty | {} |", labels.join(" | "));
        let _ = writeln!(output, "|{}", "---|".repeat(labels.len() + 1));
        for (row, values) in report.faculty.iter().zip(&report.matrix) {
            let cells: Vec<String> = values.iter().map(|v| fmt_value(*v, 2)).collect();
            let _ = writeln!(output, "| {} | {} |", row.faculty_name, cells.join(" | "));
        }
        let _ = writeln!(output);
    }

    if view.includes(View::Raw) {
        let _ = writeln!(output, "## Raw Feedback Entries (Student Info Hidden)");
        for entry in &report.raw {
            let _ = writeln!(
                output,
                "- {} {} ({}): [{}] {}",
                entry.created_at.format("%Y-%m-%d %H:%M"),
                entry.faculty_name,
                entry.subject,
                entry.scores,
                entry.comments.as_deref().unwrap_or("")
            );
        }
    }

    output
}

pub fn render_json(report: &ScopeReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Faculty summary as CSV with one `Qn_avg` column per active question.
pub fn render_csv(report: &ScopeReport) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![
        "faculty_name".to_string(),
        "subject".to_string(),
        "department".to_string(),
        "response_count".to_string(),
    ];
    header.extend(
        question_labels(report.questions.len())
            .into_iter()
            .map(|label| format!("{label}_avg")),
    );
    header.extend(["overall_avg", "overall_pct", "band"].map(String::from));
    writer.write_record(&header)?;

    for row in &report.faculty {
        let mut record = vec![
            row.faculty_name.clone(),
            row.subject.clone(),
            row.department.clone(),
            row.response_count.to_string(),
        ];
        record.extend(row.per_question_avg.iter().map(|v| csv_value(*v)));
        record.push(csv_value(row.overall_avg));
        record.push(csv_value(row.overall_pct));
        record.push(row.band.label().to_string());
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

fn csv_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn question(i: i32) -> Question {
        Question {
            id: i,
            text: format!("Question {i}"),
            order: i,
            active: true,
        }
    }

    fn snapshot(faculty: Vec<FacultyAssignment>) -> ReferenceSnapshot {
        ReferenceSnapshot {
            version: 42,
            loaded_at: Utc::now(),
            students: Vec::new(),
            faculty,
        }
    }

    fn assignment(name: &str, subject: &str) -> FacultyAssignment {
        FacultyAssignment {
            serial_no: "1".to_string(),
            faculty_name: name.to_string(),
            subject: subject.to_string(),
            department: "CSE".to_string(),
            branch: "II-CSD".to_string(),
            section: None,
        }
    }

    fn submission(name: &str, subject: &str, scores: &str) -> SubmissionRecord {
        SubmissionRecord {
            id: Uuid::new_v4(),
            student_id: "S001".to_string(),
            branch: "II-CSD".to_string(),
            section: None,
            faculty_name: name.to_string(),
            subject: subject.to_string(),
            department: "CSE".to_string(),
            scores: scores.to_string(),
            comments: Some("great".to_string()),
            created_at: Utc::now(),
        }
    }

    fn report(faculty: Vec<FacultyAssignment>, submissions: &[SubmissionRecord]) -> ScopeReport {
        build_scope_report(
            &Scope::new("II-CSD", None),
            &snapshot(faculty),
            &[question(1), question(2), question(3)],
            submissions,
            3,
        )
    }

    #[test]
    fn status_reflects_missing_data() {
        assert_eq!(report(vec![], &[]).status, ScopeStatus::NoRoster);
        assert_eq!(
            report(vec![assignment("Dr. A", "DBMS")], &[]).status,
            ScopeStatus::NoFeedback
        );
        assert_eq!(
            report(
                vec![assignment("Dr. A", "DBMS")],
                &[submission("Dr. Z", "DBMS", "1,2,3")]
            )
            .status,
            ScopeStatus::NoMatchingFaculty
        );
        assert_eq!(
            report(
                vec![assignment("Dr. A", "DBMS")],
                &[submission("Dr. A", "DBMS", "1,2,3")]
            )
            .status,
            ScopeStatus::Ready
        );
    }

    #[test]
    fn empty_scope_renders_message_instead_of_tables() {
        let markdown = render_markdown(&report(vec![assignment("Dr. A", "DBMS")], &[]), View::All);
        assert!(markdown.contains("No feedback submitted yet"));
        assert!(!markdown.contains("Faculty-wise Summary"));

        let markdown = render_markdown(&report(vec![], &[]), View::All);
        assert!(markdown.contains("No faculty roster is loaded"));
    }

    #[test]
    fn markdown_summary_lists_each_faculty() {
        let report = report(
            vec![assignment("Dr. A", "DBMS"), assignment("Dr. B", "OS")],
            &[
                submission("Dr. A", "DBMS", "8,9,10"),
                submission("Dr. A", "DBMS", "6,7,8"),
                submission("Dr. B", "OS", "3,x,5"),
            ],
        );
        let markdown = render_markdown(&report, View::Summary);
        assert!(markdown.contains("| Faculty | Subject | Department | Responses | Q1 | Q2 | Q3 |"));
        assert!(markdown.contains("| Dr. A | DBMS | CSE | 2 | 7.00 | 8.00 | 9.00 | 8.00 | 80.0 | excellent |"));
        assert!(markdown.contains("| Dr. B | OS | CSE | 1 | 3.00 | - | 5.00 | 4.00 | 40.0 | fair |"));
        assert!(!markdown.contains("Raw Feedback"));
    }

    #[test]
    fn raw_view_hides_student_ids() {
        let report = report(
            vec![assignment("Dr. A", "DBMS")],
            &[submission("Dr. A", "DBMS", "8,9,10")],
        );
        let markdown = render_markdown(&report, View::Raw);
        assert!(markdown.contains("[8,9,10] great"));
        assert!(!markdown.contains("S001"));
        assert!(!render_json(&report).unwrap().contains("S001"));
    }

    #[test]
    fn csv_has_a_column_per_question() {
        let report = report(
            vec![assignment("Dr. A", "DBMS")],
            &[submission("Dr. A", "DBMS", "8,9,x")],
        );
        let csv = render_csv(&report).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "faculty_name,subject,department,response_count,Q1_avg,Q2_avg,Q3_avg,overall_avg,overall_pct,band"
        );
        assert_eq!(lines.next().unwrap(), "Dr. A,DBMS,CSE,1,8,9,,8.5,85,excellent");
    }

    #[test]
    fn json_carries_contract_field_names() {
        let report = report(
            vec![assignment("Dr. A", "DBMS")],
            &[submission("Dr. A", "DBMS", "8,9,10")],
        );
        let value: serde_json::Value = serde_json::from_str(&render_json(&report).unwrap()).unwrap();
        let row = &value["faculty"][0];
        assert_eq!(row["faculty_name"], "Dr. A");
        assert_eq!(row["response_count"], 1);
        assert_eq!(row["overall_avg"], 9.0);
        assert_eq!(row["overall_pct"], 90.0);
        assert_eq!(row["band"], "excellent");
        assert_eq!(value["status"], "ready");
    }
}
