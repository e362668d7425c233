use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;

use anyhow::Context;

use crate::session::StaffRole;

#[derive(Debug, Clone)]
pub struct StaffCredential {
    pub role: StaffRole,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub roster_dir: PathBuf,
    pub staff: Vec<StaffCredential>,
    pub top_n: usize,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<NonZeroU32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got {raw:?}"))?
                .get(),
            None => 5,
        };
        let top_n = match get("REPORT_TOP_N") {
            Some(raw) => raw
                .trim()
                .parse::<NonZeroUsize>()
                .with_context(|| format!("REPORT_TOP_N must be a positive integer, got {raw:?}"))?
                .get(),
            None => 3,
        };

        let mut staff = Vec::new();
        for role in StaffRole::ALL {
            let prefix = role.env_prefix();
            let user = get(&format!("FEEDBACK_{prefix}_USER"));
            let password = get(&format!("FEEDBACK_{prefix}_PASSWORD"));
            if let (Some(username), Some(password)) = (user, password) {
                staff.push(StaffCredential {
                    role,
                    username,
                    password,
                });
            }
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            max_connections,
            roster_dir: get("ROSTER_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            staff,
            top_n,
            log_file: get("LOG_FILE_PATH").map(PathBuf::from),
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance")
    }
}
