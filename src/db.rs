use crate::{
    auth::{DbUserSession, Role, UserSession},
    error::AppError,
    models::{DbOrganization, Organization},
    schema::CURRENT_SCHEMA,
};
use chrono::{NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{info, instrument};

/// Opens the pool. An in-memory database lives only as long as its single
/// connection, so that connection is never recycled.
#[instrument]
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>, AppError> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };

    info!("Connected to database");
    Ok(pool)
}

#[instrument(skip(pool))]
pub async fn apply_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Applying database schema");
    sqlx::raw_sql(CURRENT_SCHEMA).execute(pool).await?;
    Ok(())
}

#[instrument(skip(pool, token))]
pub async fn create_user_session(
    pool: &Pool<Sqlite>,
    email: &str,
    role: Role,
    token: &str,
    expires_at: NaiveDateTime,
) -> Result<i64, AppError> {
    info!("Creating user session");
    let res = sqlx::query(
        "INSERT INTO user_sessions (email, role, token, expires_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(email)
    .bind(role.as_str())
    .bind(token)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument(skip_all)]
pub async fn get_session_by_token(
    pool: &Pool<Sqlite>,
    token: &str,
) -> Result<UserSession, AppError> {
    let row = sqlx::query_as::<_, DbUserSession>(
        "SELECT id, email, role, token, expires_at FROM user_sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(session) => UserSession::try_from(session)
            .map_err(|e| AppError::Internal(format!("Corrupt session row: {}", e))),
        _ => Err(AppError::Authentication(
            "Session token not recognised".to_string(),
        )),
    }
}

#[instrument(skip_all)]
pub async fn invalidate_session(pool: &Pool<Sqlite>, token: &str) -> Result<(), AppError> {
    info!("Invalidating session");
    sqlx::query("DELETE FROM user_sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn clean_expired_sessions(pool: &Pool<Sqlite>) -> Result<u64, AppError> {
    let now = Utc::now().naive_utc();
    let res = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}

/// Inserts a freshly created organization. Fails if the id is already stored.
#[instrument(skip(pool, organization), fields(organization_id = organization.id))]
pub async fn insert_organization(
    pool: &Pool<Sqlite>,
    organization: &Organization,
) -> Result<(), AppError> {
    info!("Inserting organization");
    let body = serde_json::to_string(organization)?;
    let now = Utc::now().naive_utc();

    sqlx::query("INSERT INTO organizations (id, name, body, synced_at) VALUES (?, ?, ?, ?)")
        .bind(organization.id)
        .bind(&organization.name)
        .bind(body)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(())
}

/// Writes the full organization entity, replacing whatever was stored.
#[instrument(skip(pool, organization), fields(organization_id = organization.id))]
pub async fn upsert_organization(
    pool: &Pool<Sqlite>,
    organization: &Organization,
) -> Result<(), AppError> {
    info!("Upserting organization");
    let body = serde_json::to_string(organization)?;
    let now = Utc::now().naive_utc();

    sqlx::query(
        "INSERT INTO organizations (id, name, body, synced_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            body = excluded.body,
            synced_at = excluded.synced_at",
    )
    .bind(organization.id)
    .bind(&organization.name)
    .bind(body)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

#[instrument(skip(pool))]
pub async fn load_organizations(pool: &Pool<Sqlite>) -> Result<Vec<Organization>, AppError> {
    info!("Loading stored organizations");
    let rows = sqlx::query_as::<_, DbOrganization>("SELECT id, body FROM organizations ORDER BY id")
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(Organization::try_from).collect()
}
