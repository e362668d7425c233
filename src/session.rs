use anyhow::bail;
use tracing::{info, warn};

use crate::config::StaffCredential;
use crate::models::Scope;
use crate::roster::ReferenceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum StaffRole {
    Hod,
    Principal,
    Admin,
}

impl StaffRole {
    pub const ALL: [StaffRole; 3] = [StaffRole::Hod, StaffRole::Principal, StaffRole::Admin];

    pub fn env_prefix(self) -> &'static str {
        match self {
            StaffRole::Hod => "HOD",
            StaffRole::Principal => "PRINCIPAL",
            StaffRole::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StudentIdentity {
    pub regd_no: String,
    pub name: String,
    pub scope: Scope,
}

/// Who is acting. Every command handler receives one of these explicitly.
#[derive(Debug, Clone)]
pub enum Session {
    Student(StudentIdentity),
    Staff { role: StaffRole, username: String },
}

impl Session {
    pub fn actor(&self) -> &str {
        match self {
            Session::Student(identity) => &identity.regd_no,
            Session::Staff { username, .. } => username,
        }
    }

    pub fn require_student(&self) -> anyhow::Result<&StudentIdentity> {
        match self {
            Session::Student(identity) => Ok(identity),
            Session::Staff { .. } => bail!("this action is only available to students"),
        }
    }

    pub fn require_staff(&self) -> anyhow::Result<StaffRole> {
        match self {
            Session::Staff { role, .. } => Ok(*role),
            Session::Student(_) => bail!("this action requires a staff login"),
        }
    }

    pub fn require_admin(&self) -> anyhow::Result<()> {
        match self.require_staff()? {
            StaffRole::Admin => Ok(()),
            _ => bail!("this action requires an admin login"),
        }
    }
}

pub fn login_student(
    snapshot: &ReferenceSnapshot,
    regd_no: &str,
    dob: &str,
    scope: &Scope,
) -> anyhow::Result<Session> {
    let Some(student) = snapshot.find_student(regd_no, dob, scope) else {
        warn!(%scope, "student login rejected");
        bail!("invalid register number, date of birth, or section");
    };
    info!(regd_no = %student.regd_no, %scope, "student logged in");
    Ok(Session::Student(StudentIdentity {
        regd_no: student.regd_no.clone(),
        name: student.name.clone(),
        scope: scope.clone(),
    }))
}

pub fn login_staff(
    credentials: &[StaffCredential],
    role: StaffRole,
    username: &str,
    password: &str,
) -> anyhow::Result<Session> {
    let matched = credentials
        .iter()
        .any(|c| c.role == role && c.username == username && c.password == password);
    if !matched {
        warn!(?role, username, "staff login rejected");
        bail!("invalid username or password");
    }
    info!(?role, username, "staff logged in");
    Ok(Session::Staff {
        role,
        username: username.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Student;
    use chrono::Utc;

    fn credentials() -> Vec<StaffCredential> {
        vec![
            StaffCredential {
                role: StaffRole::Hod,
                username: "hod".to_string(),
                password: "hod-pass".to_string(),
            },
            StaffCredential {
                role: StaffRole::Admin,
                username: "admin".to_string(),
                password: "admin-pass".to_string(),
            },
        ]
    }

    fn snapshot() -> ReferenceSnapshot {
        ReferenceSnapshot {
            version: 1,
            loaded_at: Utc::now(),
            students: vec![Student {
                regd_no: "23ABC001".to_string(),
                name: "Asha Rao".to_string(),
                dob: "01/04/2005".to_string(),
                branch: "II-CSE".to_string(),
                section: Some("A".to_string()),
            }],
            faculty: Vec::new(),
        }
    }

    #[test]
    fn staff_login_checks_role_and_password() {
        let creds = credentials();
        assert!(login_staff(&creds, StaffRole::Hod, "hod", "hod-pass").is_ok());
        assert!(login_staff(&creds, StaffRole::Hod, "hod", "wrong").is_err());
        assert!(login_staff(&creds, StaffRole::Admin, "hod", "hod-pass").is_err());
        assert!(login_staff(&creds, StaffRole::Principal, "principal", "").is_err());
    }

    #[test]
    fn role_guards() {
        let creds = credentials();
        let hod = login_staff(&creds, StaffRole::Hod, "hod", "hod-pass").unwrap();
        assert_eq!(hod.require_staff().unwrap(), StaffRole::Hod);
        assert_eq!(hod.actor(), "hod");
        assert!(hod.require_admin().is_err());
        assert!(hod.require_student().is_err());

        let admin = login_staff(&creds, StaffRole::Admin, "admin", "admin-pass").unwrap();
        assert!(admin.require_admin().is_ok());
    }

    #[test]
    fn student_login_uses_snapshot() {
        let snapshot = snapshot();
        let scope = Scope::new("II-CSE", Some("A".to_string()));
        let session = login_student(&snapshot, "23abc001", "01/04/2005", &scope).unwrap();
        let identity = session.require_student().unwrap();
        assert_eq!(identity.regd_no, "23ABC001");
        assert!(session.require_staff().is_err());

        assert!(login_student(&snapshot, "23abc001", "04/01/2005", &scope).is_err());
    }
}
