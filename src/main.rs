use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod aggregate;
mod config;
mod db;
mod guard;
mod models;
mod report;
mod roster;
mod scores;
mod session;

use crate::config::Config;
use crate::guard::{SubmissionKey, SubmitOutcome};
use crate::models::{NewSubmission, Scope};
use crate::report::View;
use crate::roster::{ReferenceSnapshot, RosterKind};
use crate::scores::{MAX_SCORE, MIN_SCORE};
use crate::session::{Session, StaffRole};

#[derive(Parser)]
#[command(name = "faculty-feedback")]
#[command(about = "Student feedback collection and faculty rating reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StaffLogin {
    #[arg(long, value_enum)]
    role: StaffRole,
    #[arg(long)]
    username: String,
    #[arg(long, env = "FEEDBACK_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args)]
struct StudentLogin {
    /// Register number as printed in the roster
    #[arg(long)]
    regd_no: String,
    /// Date of birth, exactly as written in the roster sheet
    #[arg(long)]
    dob: String,
    #[arg(long)]
    branch: String,
    #[arg(long)]
    section: Option<String>,
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long)]
    branch: String,
    #[arg(long)]
    section: Option<String>,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope::new(&self.branch, self.section.clone())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum QuestionCommand {
    /// Show the question catalog, active questions first
    List,
    /// Retire the active catalog and install one question per line from a file
    Replace {
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        login: StaffLogin,
    },
    /// Retire a single question
    Deactivate {
        #[arg(long)]
        id: i32,
        #[command(flatten)]
        login: StaffLogin,
    },
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the default questionnaire into an empty catalog
    Seed,
    /// Inspect or edit the question catalog
    Questions {
        #[command(subcommand)]
        action: QuestionCommand,
    },
    /// Copy a student or faculty roster sheet into the roster directory
    InstallRoster {
        #[arg(long, value_enum)]
        kind: RosterKind,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        file: PathBuf,
        #[command(flatten)]
        login: StaffLogin,
    },
    /// List the faculty a student can give feedback on
    Faculty {
        #[command(flatten)]
        login: StudentLogin,
    },
    /// Submit feedback for one faculty member
    Submit {
        #[command(flatten)]
        login: StudentLogin,
        #[arg(long)]
        faculty: String,
        /// Needed only when the faculty member teaches more than one subject
        #[arg(long)]
        subject: Option<String>,
        /// One score per active question, e.g. "7,8,9,10,6"
        #[arg(long)]
        scores: String,
        #[arg(long)]
        comments: Option<String>,
    },
    /// Generate an aggregated feedback report for a branch/section
    Report {
        #[command(flatten)]
        login: StaffLogin,
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long, value_enum, default_value = "all")]
        view: View,
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete every stored submission
    ResetFeedback {
        #[command(flatten)]
        login: StaffLogin,
        #[arg(long)]
        confirm: bool,
    },
}

fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let (json_layer, guard) = match &config.log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "faculty-feedback.log".into());
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    guard
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

fn staff_session(config: &Config, login: &StaffLogin) -> anyhow::Result<Session> {
    session::login_staff(&config.staff, login.role, &login.username, &login.password)
}

fn student_session(snapshot: &ReferenceSnapshot, login: &StudentLogin) -> anyhow::Result<Session> {
    let scope = Scope::new(&login.branch, login.section.clone());
    session::login_student(snapshot, &login.regd_no, &login.dob, &scope)
}

/// Parses a new submission's scores; unlike stored rows these must be complete.
fn parse_new_scores(raw: &str, expected: usize) -> anyhow::Result<Vec<u8>> {
    let mut scores = Vec::new();
    for token in raw.split(',') {
        let value: u8 = token
            .trim()
            .parse()
            .with_context(|| format!("score {:?} is not a number", token.trim()))?;
        if !(MIN_SCORE..=MAX_SCORE).contains(&value) {
            bail!("score {value} is outside {MIN_SCORE}..={MAX_SCORE}");
        }
        scores.push(value);
    }
    if scores.len() != expected {
        bail!(
            "expected {expected} scores, one per active question, got {}",
            scores.len()
        );
    }
    Ok(scores)
}

fn read_question_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let questions: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if questions.is_empty() {
        bail!("{} contains no questions", path.display());
    }
    Ok(questions)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    let _log_guard = init_tracing(&config);
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&config).await?;
            let inserted = db::seed_questions(&pool).await?;
            if inserted == 0 {
                println!("Question catalog already populated.");
            } else {
                println!("Inserted {inserted} default questions.");
            }
        }
        Commands::Questions { action } => {
            let pool = connect(&config).await?;
            match action {
                QuestionCommand::List => {
                    for q in db::fetch_all_questions(&pool).await? {
                        let state = if q.active { "active" } else { "retired" };
                        println!("[{}] #{} ({state}) {}", q.id, q.order, q.text);
                    }
                }
                QuestionCommand::Replace { file, login } => {
                    staff_session(&config, &login)?.require_admin()?;
                    let questions = read_question_file(&file)?;
                    let retired = db::replace_questions(&pool, &questions).await?;
                    println!(
                        "Installed {} questions, retired {retired}.",
                        questions.len()
                    );
                }
                QuestionCommand::Deactivate { id, login } => {
                    staff_session(&config, &login)?.require_admin()?;
                    if db::deactivate_question(&pool, id).await? {
                        println!("Question {id} retired.");
                    } else {
                        println!("No active question with id {id}.");
                    }
                }
            }
        }
        Commands::InstallRoster {
            kind,
            scope,
            file,
            login,
        } => {
            staff_session(&config, &login)?.require_admin()?;
            let target = roster::install_roster_file(&config.roster_dir, kind, &scope.scope(), &file)?;
            let snapshot = ReferenceSnapshot::load(&config.roster_dir)?;
            println!(
                "Installed {} (roster version {:016x}).",
                target.display(),
                snapshot.version
            );
        }
        Commands::Faculty { login } => {
            let snapshot = ReferenceSnapshot::load(&config.roster_dir)?;
            let session = student_session(&snapshot, &login)?;
            let student = session.require_student()?;
            let pool = connect(&config).await?;

            let existing: Vec<SubmissionKey> =
                db::fetch_student_submissions(&pool, &student.regd_no, &student.scope)
                    .await?
                    .iter()
                    .map(SubmissionKey::from)
                    .collect();
            let faculty = snapshot.faculty_for(&student.scope);

            println!("Hi {}, faculty for {}:", student.name, student.scope);
            if faculty.is_empty() {
                println!("No faculty roster is loaded for this branch/section.");
            }
            for entry in faculty {
                let key = SubmissionKey::new(
                    &student.regd_no,
                    &student.scope.branch,
                    student.scope.section.as_deref(),
                    &entry.faculty_name,
                    &entry.subject,
                );
                let state = if guard::already_submitted(&existing, &key) {
                    "feedback submitted"
                } else {
                    "pending"
                };
                println!(
                    "- {}. {} ({}, {}): {state}",
                    entry.serial_no, entry.faculty_name, entry.subject, entry.department
                );
            }
        }
        Commands::Submit {
            login,
            faculty,
            subject,
            scores,
            comments,
        } => {
            let snapshot = ReferenceSnapshot::load(&config.roster_dir)?;
            let session = student_session(&snapshot, &login)?;
            let student = session.require_student()?;

            let roster = snapshot.faculty_for(&student.scope);
            let entry = roster::select_faculty(&roster, &faculty, subject.as_deref())
                .with_context(|| format!("cannot record feedback for {}", student.scope))?;

            let pool = connect(&config).await?;
            let questions = db::fetch_active_questions(&pool).await?;
            let scores = parse_new_scores(&scores, aggregate::catalog_width(&questions))?;

            let submission = NewSubmission {
                student_id: student.regd_no.clone(),
                branch: student.scope.branch.clone(),
                section: student.scope.section.clone(),
                faculty_name: entry.faculty_name.clone(),
                subject: entry.subject.clone(),
                department: entry.department.clone(),
                scores,
                comments: comments.filter(|c| !c.trim().is_empty()),
            };

            match db::insert_submission(&pool, &submission).await? {
                SubmitOutcome::Accepted(id) => {
                    info!(%id, faculty = %submission.faculty_name, "feedback recorded");
                    println!("Thank you! Feedback recorded.");
                }
                SubmitOutcome::AlreadySubmitted => {
                    warn!(faculty = %submission.faculty_name, "duplicate feedback rejected");
                    println!("Feedback already submitted.");
                }
            }
        }
        Commands::Report {
            login,
            scope,
            view,
            format,
            out,
        } => {
            let session = staff_session(&config, &login)?;
            let role = session.require_staff()?;
            let scope = scope.scope();
            let snapshot = ReferenceSnapshot::load(&config.roster_dir)?;
            let pool = connect(&config).await?;
            let questions = db::fetch_active_questions(&pool).await?;
            let submissions = db::fetch_submissions(&pool, &scope).await?;

            let scope_report = report::build_scope_report(
                &scope,
                &snapshot,
                &questions,
                &submissions,
                config.top_n,
            );
            info!(
                ?role,
                actor = session.actor(),
                %scope,
                status = ?scope_report.status,
                rows = scope_report.faculty.len(),
                "report built"
            );

            let rendered = match format {
                OutputFormat::Markdown => report::render_markdown(&scope_report, view),
                OutputFormat::Json => report::render_json(&scope_report)?,
                OutputFormat::Csv => report::render_csv(&scope_report)?,
            };
            match out {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Report written to {}.", path.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::ResetFeedback { login, confirm } => {
            staff_session(&config, &login)?.require_admin()?;
            if !confirm {
                bail!("refusing to delete all feedback without --confirm");
            }
            let pool = connect(&config).await?;
            let deleted = db::reset_feedback(&pool).await?;
            warn!(deleted, "all feedback cleared");
            println!("All feedback cleared ({deleted} submissions).");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_scores_must_match_catalog() {
        assert_eq!(parse_new_scores("7, 8,9", 3).unwrap(), vec![7, 8, 9]);
        assert!(parse_new_scores("7,8", 3).is_err());
        assert!(parse_new_scores("7,8,11", 3).is_err());
        assert!(parse_new_scores("7,x,9", 3).is_err());
        assert!(parse_new_scores("0,8,9", 3).is_err());
    }

    #[test]
    fn question_file_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!("faculty-feedback-questions-{}.txt", std::process::id()));
        std::fs::write(&path, "First question\n\n  Second question  \n").unwrap();
        assert_eq!(
            read_question_file(&path).unwrap(),
            vec!["First question".to_string(), "Second question".to_string()]
        );
        std::fs::write(&path, "\n \n").unwrap();
        assert!(read_question_file(&path).is_err());
    }

    #[test]
    fn cli_parses_report_command() {
        let cli = Cli::try_parse_from([
            "faculty-feedback",
            "report",
            "--role",
            "hod",
            "--username",
            "hod",
            "--password",
            "pw",
            "--branch",
            "II-CSE",
            "--section",
            "A",
            "--view",
            "ranking",
            "--format",
            "csv",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { scope, view, .. } => {
                assert_eq!(scope.scope(), Scope::new("II-CSE", Some("A".to_string())));
                assert_eq!(view, View::Ranking);
            }
            _ => panic!("expected report command"),
        }
    }
}
