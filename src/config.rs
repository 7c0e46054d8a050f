use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::{info, warn};

use crate::auth::Role;

pub fn load_environment() -> anyhow::Result<()> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> anyhow::Result<()> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)
        .with_context(|| format!("Failed to load environment file {}", path))?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// How unrecorded attendance is treated when a toggle reaches it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendancePolicy {
    /// `None` keeps the day unmarked and refuses to toggle it.
    pub default_presence: Option<bool>,
}

impl AttendancePolicy {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let default_presence = match value.trim().to_ascii_lowercase().as_str() {
            "present" => Some(true),
            "absent" => Some(false),
            "unmarked" | "" => None,
            other => bail!("Unknown attendance default: {}", other),
        };
        Ok(Self { default_presence })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(250),
        }
    }
}

/// A console login. The password is kept as a bcrypt hash only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub database_url: String,
    pub attendance: AttendancePolicy,
    pub sync: SyncPolicy,
    pub seed_demo_data: bool,
    pub accounts: Vec<Account>,
    pub honeycomb_api_key: Option<String>,
}

fn var(name: &str) -> Option<String> {
    dotenvy::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn account_from_env(prefix: &str, role: Role) -> anyhow::Result<Option<Account>> {
    let email = var(&format!("{}_EMAIL", prefix));
    let hash = var(&format!("{}_PASSWORD_HASH", prefix));

    match (email, hash) {
        (Some(email), Some(password_hash)) => Ok(Some(Account {
            email,
            password_hash,
            role,
        })),
        (None, None) => Ok(None),
        _ => bail!(
            "{}_EMAIL and {}_PASSWORD_HASH must be set together",
            prefix,
            prefix
        ),
    }
}

impl ConsoleConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite::memory:".to_string());

        let attendance = match var("ATTENDANCE_DEFAULT") {
            Some(value) => AttendancePolicy::parse(&value)?,
            None => AttendancePolicy::default(),
        };

        let mut sync = SyncPolicy::default();
        if let Some(value) = var("SYNC_MAX_ATTEMPTS") {
            sync.max_attempts = value
                .parse()
                .with_context(|| format!("SYNC_MAX_ATTEMPTS is not a number: {}", value))?;
            if sync.max_attempts == 0 {
                bail!("SYNC_MAX_ATTEMPTS must be at least 1");
            }
        }
        if let Some(value) = var("SYNC_BACKOFF_MS") {
            let millis: u64 = value
                .parse()
                .with_context(|| format!("SYNC_BACKOFF_MS is not a number: {}", value))?;
            sync.backoff = Duration::from_millis(millis);
        }

        let seed_demo_data = var("SEED_DEMO_DATA")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let accounts: Vec<Account> = [
            account_from_env("CONSOLE_ADMIN", Role::Admin)?,
            account_from_env("CONSOLE_PRINCIPAL", Role::Principal)?,
        ]
        .into_iter()
        .flatten()
        .collect();

        if accounts.is_empty() {
            warn!("No console accounts configured, nobody will be able to log in");
        }

        Ok(Self {
            database_url,
            attendance,
            sync,
            seed_demo_data,
            accounts,
            honeycomb_api_key: var("HONEYCOMB_API_KEY"),
        })
    }
}
