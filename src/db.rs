use anyhow::Context;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::guard::{SubmissionKey, SubmitOutcome};
use crate::models::{section_key, NewSubmission, Question, Scope, SubmissionRecord};
use crate::scores::encode_scores;

pub const DEFAULT_QUESTIONS: [&str; 15] = [
    "Teacher comes to the class in time",
    "Teacher teaches effectively",
    "Teacher speaks clearly and audibly",
    "Teacher plans lessons with clear objectives",
    "Teacher has good command on the subject",
    "Teacher writes and draws legibly",
    "Teacher asks questions to promote interaction and effective thinking",
    "Teacher encourages creativity",
    "Teacher is courteous and impartial",
    "Teacher completes syllabus",
    "Teacher evaluates fairly",
    "Teacher returns scripts promptly",
    "Teacher helps needy students",
    "Teacher gives practical knowledge",
    "Overall rating of the Teacher",
];

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Inserts the default questionnaire when the catalog has never been filled.
pub async fn seed_questions(pool: &PgPool) -> anyhow::Result<usize> {
    let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM faculty_feedback.questions")
        .fetch_one(pool)
        .await?
        .get("count");
    if count > 0 {
        debug!(count, "question catalog already populated");
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for (i, text) in DEFAULT_QUESTIONS.iter().enumerate() {
        sqlx::query("INSERT INTO faculty_feedback.questions (question_text, order_no) VALUES ($1, $2)")
            .bind(*text)
            .bind(i as i32 + 1)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(DEFAULT_QUESTIONS.len())
}

fn question_from_row(row: &sqlx::postgres::PgRow) -> Question {
    Question {
        id: row.get("id"),
        text: row.get("question_text"),
        order: row.get("order_no"),
        active: row.get("is_active"),
    }
}

pub async fn fetch_active_questions(pool: &PgPool) -> anyhow::Result<Vec<Question>> {
    let rows = sqlx::query(
        r#"
        SELECT id, question_text, order_no, is_active
        FROM faculty_feedback.questions
        WHERE is_active
        ORDER BY order_no, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(question_from_row).collect())
}

pub async fn fetch_all_questions(pool: &PgPool) -> anyhow::Result<Vec<Question>> {
    let rows = sqlx::query(
        r#"
        SELECT id, question_text, order_no, is_active
        FROM faculty_feedback.questions
        ORDER BY is_active DESC, order_no, id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(question_from_row).collect())
}

/// Retires the whole active catalog and installs `texts` in order.
///
/// Old rows stay in the table so historical submissions remain explainable.
pub async fn replace_questions(pool: &PgPool, texts: &[String]) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let retired = sqlx::query("UPDATE faculty_feedback.questions SET is_active = FALSE WHERE is_active")
        .execute(&mut *tx)
        .await?
        .rows_affected();

    for (i, text) in texts.iter().enumerate() {
        sqlx::query("INSERT INTO faculty_feedback.questions (question_text, order_no) VALUES ($1, $2)")
            .bind(text)
            .bind(i as i32 + 1)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    info!(retired, installed = texts.len(), "question catalog replaced");
    Ok(retired)
}

pub async fn deactivate_question(pool: &PgPool, id: i32) -> anyhow::Result<bool> {
    let result = sqlx::query(
        "UPDATE faculty_feedback.questions SET is_active = FALSE WHERE id = $1 AND is_active",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Stores a submission unless one with the same key already exists.
///
/// The unique constraint on the key makes the check and the write a single
/// statement, so concurrent duplicates cannot both land.
pub async fn insert_submission(
    pool: &PgPool,
    submission: &NewSubmission,
) -> anyhow::Result<SubmitOutcome> {
    let key = SubmissionKey::from(submission);
    let id = Uuid::new_v4();

    let result = sqlx::query(
        r#"
        INSERT INTO faculty_feedback.submissions
        (id, student_regd_no, branch_code, section, faculty_name, subject,
         department, q_scores, comments, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        ON CONFLICT (student_regd_no, branch_code, section, faculty_name, subject) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&key.student_id)
    .bind(&key.branch)
    .bind(&key.section)
    .bind(&key.faculty_name)
    .bind(&key.subject)
    .bind(&submission.department)
    .bind(encode_scores(&submission.scores))
    .bind(submission.comments.as_deref())
    .execute(pool)
    .await
    .context("failed to store submission")?;

    if result.rows_affected() == 0 {
        Ok(SubmitOutcome::AlreadySubmitted)
    } else {
        Ok(SubmitOutcome::Accepted(id))
    }
}

fn submission_from_row(row: &sqlx::postgres::PgRow) -> SubmissionRecord {
    let section: String = row.get("section");
    SubmissionRecord {
        id: row.get("id"),
        student_id: row.get("student_regd_no"),
        branch: row.get("branch_code"),
        section: if section.is_empty() { None } else { Some(section) },
        faculty_name: row.get("faculty_name"),
        subject: row.get("subject"),
        department: row.get("department"),
        scores: row.get("q_scores"),
        comments: row.get("comments"),
        created_at: row.get("created_at"),
    }
}

pub async fn fetch_submissions(pool: &PgPool, scope: &Scope) -> anyhow::Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_regd_no, branch_code, section, faculty_name, subject,
               department, q_scores, comments, created_at
        FROM faculty_feedback.submissions
        WHERE branch_code = $1 AND section = $2
        ORDER BY created_at
        "#,
    )
    .bind(&scope.branch)
    .bind(section_key(scope.section.as_deref()))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(submission_from_row).collect())
}

pub async fn fetch_student_submissions(
    pool: &PgPool,
    regd_no: &str,
    scope: &Scope,
) -> anyhow::Result<Vec<SubmissionRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, student_regd_no, branch_code, section, faculty_name, subject,
               department, q_scores, comments, created_at
        FROM faculty_feedback.submissions
        WHERE student_regd_no = $1 AND branch_code = $2 AND section = $3
        "#,
    )
    .bind(regd_no)
    .bind(&scope.branch)
    .bind(section_key(scope.section.as_deref()))
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(submission_from_row).collect())
}

pub async fn reset_feedback(pool: &PgPool) -> anyhow::Result<u64> {
    let result = sqlx::query("DELETE FROM faculty_feedback.submissions")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
