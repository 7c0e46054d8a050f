use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::db::get_session_by_token;

use super::ConsoleUser;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ConsoleUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authenticate_request(request).await
    }
}

#[tracing::instrument(name = "console_auth_guard", skip_all)]
async fn authenticate_request(request: &Request<'_>) -> Outcome<ConsoleUser, ()> {
    let token = request
        .cookies()
        .get_private("session_token")
        .map(|c| c.value().to_string());

    let Some(token) = token else {
        return Outcome::Error((Status::Unauthorized, ()));
    };

    let db = match request.rocket().state::<SqlitePool>() {
        Some(pool) => pool,
        _ => {
            tracing::error!("Database pool not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        }
    };

    match get_session_by_token(db, &token).await {
        Ok(session) => {
            if !session.is_valid() {
                tracing::warn!("Session token expired");
                return Outcome::Error((Status::Unauthorized, ()));
            }

            tracing::info!(email = %session.email, role = %session.role, "User authenticated via session token");
            Outcome::Success(session.user())
        }
        Err(err) => {
            tracing::warn!(error = ?err, "Invalid session token");
            Outcome::Error((Status::Unauthorized, ()))
        }
    }
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Unauthorized",
        "message": "Authentication required"
    });

    Custom(Status::Unauthorized, Json(error_json))
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<Value>> {
    let error_json = json!({
        "error": "Forbidden",
        "message": "You don't have permission to perform this action"
    });

    Custom(Status::Forbidden, Json(error_json))
}
