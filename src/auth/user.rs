use chrono::{NaiveDateTime, Utc};
use rocket::http::Status;
use serde::Serialize;

use super::{Permission, Role};

/// The account behind an authenticated request.
#[derive(Debug, Serialize, Clone)]
pub struct ConsoleUser {
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub expires_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUserSession {
    pub id: Option<i64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub token: Option<String>,
    pub expires_at: Option<NaiveDateTime>,
}

impl TryFrom<DbUserSession> for UserSession {
    type Error = anyhow::Error;

    fn try_from(db: DbUserSession) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db.id.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            role: Role::from_str(&db.role.unwrap_or_default())?,
            token: db.token.unwrap_or_default(),
            expires_at: db.expires_at.unwrap_or_default(),
        })
    }
}

impl UserSession {
    pub fn generate_token() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now().naive_utc()
    }

    pub fn user(&self) -> ConsoleUser {
        ConsoleUser {
            email: self.email.clone(),
            role: self.role,
        }
    }
}

impl ConsoleUser {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), Status> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                email = %self.email,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(Status::Forbidden)
        }
    }

    pub fn require_all_permissions(&self, permissions: &[Permission]) -> Result<(), Status> {
        if permissions.iter().all(|p| self.role.has_permission(*p)) {
            Ok(())
        } else {
            tracing::warn!(
                email = %self.email,
                role = %self.role.as_str(),
                permissions = ?permissions,
                "Permission denied (require all)"
            );
            Err(Status::Forbidden)
        }
    }
}
