//! Student and faculty rosters loaded from CSV sheets.
//!
//! Sheets live under `<dir>/students/S_<BRANCH>[_<SECTION>].csv` and
//! `<dir>/faculty/F_<BRANCH>[_<SECTION>].csv`; the cohort comes from the file
//! name, not the sheet contents. Branch names cannot contain `_`, which
//! separates the section.
//!
//! Older III-CSD sheets were saved as `S_lll-CSD.csv` / `F_lll-CSD.csv`
//! (lowercase L); those load as `III-CSD`.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::models::{FacultyAssignment, Scope, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RosterKind {
    Students,
    Faculty,
}

impl RosterKind {
    fn subdir(self) -> &'static str {
        match self {
            RosterKind::Students => "students",
            RosterKind::Faculty => "faculty",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            RosterKind::Students => "S_",
            RosterKind::Faculty => "F_",
        }
    }
}

#[derive(Debug, Deserialize)]
struct StudentRow {
    #[serde(rename = "Regd. No.")]
    regd_no: String,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "DOB")]
    dob: String,
}

#[derive(Debug, Deserialize)]
struct FacultyRow {
    #[serde(rename = "S.No")]
    serial_no: String,
    #[serde(rename = "Faculty Name")]
    faculty_name: String,
    #[serde(rename = "Subject (Full Form)")]
    subject: String,
    #[serde(rename = "Department")]
    department: String,
}

pub fn file_name_for(kind: RosterKind, scope: &Scope) -> String {
    match &scope.section {
        Some(section) => format!("{}{}_{}.csv", kind.prefix(), scope.branch, section),
        None => format!("{}{}.csv", kind.prefix(), scope.branch),
    }
}

pub fn parse_file_name(kind: RosterKind, file_name: &str) -> Option<Scope> {
    let rest = file_name.strip_prefix(kind.prefix())?;
    let stem = rest
        .strip_suffix(".csv")
        .or_else(|| rest.strip_suffix(".CSV"))?;
    let (branch, section) = match stem.split_once('_') {
        Some((branch, section)) => (branch, Some(section.to_string())),
        None => (stem, None),
    };
    if branch.is_empty() {
        return None;
    }
    let branch = match branch.strip_prefix("lll-") {
        Some(rest) => format!("III-{rest}"),
        None => branch.to_string(),
    };
    Some(Scope::new(branch, section))
}

/// Rejects scopes whose canonical file name would not load back as the same
/// scope, or would escape the roster directory.
fn check_installable(kind: RosterKind, scope: &Scope) -> anyhow::Result<()> {
    let unsafe_part = |part: &str| part.contains(['/', '\\']) || part.contains("..");
    if scope.branch.contains('_') || unsafe_part(&scope.branch) {
        bail!("branch {:?} cannot be used in a roster file name", scope.branch);
    }
    if let Some(section) = &scope.section {
        if unsafe_part(section) {
            bail!("section {section:?} cannot be used in a roster file name");
        }
    }
    if parse_file_name(kind, &file_name_for(kind, scope)).as_ref() != Some(scope) {
        bail!("roster for {scope} would not load back under the same branch/section");
    }
    Ok(())
}

/// Picks the roster row a student means by `faculty_name`.
///
/// A subject is required when the name appears on more than one row.
pub fn select_faculty<'a>(
    roster: &'a [FacultyAssignment],
    faculty_name: &str,
    subject: Option<&str>,
) -> anyhow::Result<&'a FacultyAssignment> {
    let matches: Vec<&FacultyAssignment> = roster
        .iter()
        .filter(|f| f.faculty_name == faculty_name)
        .filter(|f| subject.map_or(true, |s| f.subject == s))
        .collect();

    match matches.as_slice() {
        [] => match subject {
            Some(subject) => bail!("{faculty_name} does not teach {subject} in this section"),
            None => bail!("{faculty_name} is not on the roster for this section"),
        },
        [entry] => Ok(*entry),
        [first, ..] if matches.iter().all(|f| f.subject == first.subject) => Ok(*first),
        _ => {
            let subjects: Vec<&str> = matches.iter().map(|f| f.subject.as_str()).collect();
            bail!(
                "{faculty_name} teaches several subjects ({}); pass --subject",
                subjects.join(", ")
            )
        }
    }
}

/// Sheets exported from spreadsheets are often Latin-1; fall back to a
/// byte-per-codepoint decode when the bytes are not UTF-8.
fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}').to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn parse_students(text: &str, scope: &Scope) -> anyhow::Result<Vec<Student>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut students = Vec::new();
    for result in reader.deserialize::<StudentRow>() {
        let row = result?;
        students.push(Student {
            regd_no: row.regd_no.trim().to_uppercase(),
            name: row.name,
            dob: row.dob.trim().to_string(),
            branch: scope.branch.clone(),
            section: scope.section.clone(),
        });
    }
    Ok(students)
}

fn parse_faculty(text: &str, scope: &Scope) -> anyhow::Result<Vec<FacultyAssignment>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());
    let mut faculty = Vec::new();
    for result in reader.deserialize::<FacultyRow>() {
        let row = result?;
        faculty.push(FacultyAssignment {
            serial_no: row.serial_no,
            faculty_name: row.faculty_name,
            subject: row.subject,
            department: row.department,
            branch: scope.branch.clone(),
            section: scope.section.clone(),
        });
    }
    Ok(faculty)
}

/// Roster files of one kind, sorted by name so the fingerprint is stable.
fn roster_files(dir: &Path, kind: RosterKind) -> anyhow::Result<Vec<(PathBuf, Scope)>> {
    let sub = dir.join(kind.subdir());
    let entries = match fs::read_dir(&sub) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %sub.display(), "roster directory missing");
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list {}", sub.display()))
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match parse_file_name(kind, name) {
            Some(scope) => files.push((path.clone(), scope)),
            None => debug!(file = name, "ignoring file with unrecognised roster name"),
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Point-in-time copy of the reference rosters.
///
/// Nothing refreshes a snapshot in place; load a new one after the roster
/// files change and compare `version` to see whether anything moved.
#[derive(Debug, Clone)]
pub struct ReferenceSnapshot {
    pub version: u64,
    pub loaded_at: DateTime<Utc>,
    pub students: Vec<Student>,
    pub faculty: Vec<FacultyAssignment>,
}

impl ReferenceSnapshot {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let mut hasher = DefaultHasher::new();
        let mut students = Vec::new();
        let mut faculty = Vec::new();

        for kind in [RosterKind::Students, RosterKind::Faculty] {
            for (path, scope) in roster_files(dir, kind)? {
                let bytes = match fs::read(&path) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable roster");
                        continue;
                    }
                };
                path.file_name().hash(&mut hasher);
                bytes.hash(&mut hasher);

                let text = decode_text(&bytes);
                let parsed = match kind {
                    RosterKind::Students => parse_students(&text, &scope)
                        .map(|rows| students.extend(rows)),
                    RosterKind::Faculty => parse_faculty(&text, &scope)
                        .map(|rows| faculty.extend(rows)),
                };
                if let Err(err) = parsed {
                    warn!(path = %path.display(), error = %err, "skipping malformed roster");
                }
            }
        }

        let snapshot = Self {
            version: hasher.finish(),
            loaded_at: Utc::now(),
            students,
            faculty,
        };
        info!(
            version = snapshot.version,
            students = snapshot.students.len(),
            faculty = snapshot.faculty.len(),
            "reference rosters loaded"
        );
        Ok(snapshot)
    }

    pub fn faculty_for(&self, scope: &Scope) -> Vec<FacultyAssignment> {
        self.faculty
            .iter()
            .filter(|f| scope.contains(&f.branch, f.section.as_deref()))
            .cloned()
            .collect()
    }

    /// Register numbers compare case-insensitively; the date of birth must
    /// match the sheet text exactly.
    pub fn find_student(&self, regd_no: &str, dob: &str, scope: &Scope) -> Option<&Student> {
        let regd_no = regd_no.trim().to_uppercase();
        let dob = dob.trim();
        self.students.iter().find(|s| {
            s.regd_no == regd_no && s.dob == dob && scope.contains(&s.branch, s.section.as_deref())
        })
    }
}

/// Copies a roster sheet into place under its canonical name.
///
/// The sheet is parsed first so a file with the wrong headers never lands
/// in the roster directory.
pub fn install_roster_file(
    dir: &Path,
    kind: RosterKind,
    scope: &Scope,
    source: &Path,
) -> anyhow::Result<PathBuf> {
    check_installable(kind, scope)?;
    let bytes = fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
    let text = decode_text(&bytes);
    let rows = match kind {
        RosterKind::Students => parse_students(&text, scope)?.len(),
        RosterKind::Faculty => parse_faculty(&text, scope)?.len(),
    };
    if rows == 0 {
        bail!("{} contains no roster rows", source.display());
    }

    let target_dir = dir.join(kind.subdir());
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("failed to create {}", target_dir.display()))?;
    let target = target_dir.join(file_name_for(kind, scope));
    fs::write(&target, &bytes).with_context(|| format!("failed to write {}", target.display()))?;
    info!(path = %target.display(), rows, "roster installed");
    Ok(target)
}
