#![recursion_limit = "256"]

use std::sync::Arc;

use campus_console::auth::{CredentialAuthenticator, SharedAuthenticator};
use campus_console::config::{ConsoleConfig, load_environment};
use campus_console::db::{apply_schema, clean_expired_sessions, connect, load_organizations};
use campus_console::error::AppError;
use campus_console::seed::demo_snapshot;
use campus_console::store::{EntityStore, Snapshot};
use campus_console::sync::{SqliteSyncSink, SyncJob, SyncQueue};
use campus_console::telemetry::init_tracing;
use campus_console::{Console, init_rocket};
use rocket::tokio;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("Server error: {0}")]
    Rocket(Box<rocket::Error>),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    load_environment()?;
    let config = ConsoleConfig::from_env()?;
    let _telemetry = init_tracing(config.honeycomb_api_key.as_deref())?;

    let pool = connect(&config.database_url).await?;
    apply_schema(&pool).await?;

    let pool_clone = pool.clone();
    tokio::spawn(async move {
        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;

        loop {
            match clean_expired_sessions(&pool_clone).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Cleaned up {} expired sessions", count);
                    }
                }
                Err(e) => {
                    error!("Failed to clean expired sessions: {}", e);
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(3600)).await;
        }
    });

    let stored = load_organizations(&pool).await?;
    let sync = SyncQueue::start(Arc::new(SqliteSyncSink::new(pool.clone())), config.sync);

    let snapshot = if stored.is_empty() && config.seed_demo_data {
        let snapshot = demo_snapshot()?;
        for organization in snapshot.organizations.iter() {
            sync.enqueue(SyncJob::Create(organization.clone()));
        }
        snapshot
    } else {
        info!(organizations = stored.len(), "Loaded organizations");
        Snapshot::from_organizations(stored)
    };

    let authenticator: SharedAuthenticator =
        Arc::new(CredentialAuthenticator::new(config.accounts.clone()));

    let _rocket = init_rocket(Console {
        pool,
        store: EntityStore::new(snapshot),
        sync,
        attendance: config.attendance,
        authenticator,
    })
    .launch()
    .await?;

    Ok(())
}
