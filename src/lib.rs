#![recursion_limit = "256"]

#[macro_use]
extern crate rocket;

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod models;
pub mod ops;
pub mod projections;
pub mod report;
pub mod schema;
pub mod seed;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod validation;
#[cfg(test)]
mod test;

use api::{
    api_add_admin, api_add_event, api_add_grade, api_add_section, api_add_student,
    api_add_teacher, api_attendance_report, api_attendance_summary, api_create_organization,
    api_delete_event, api_delete_grade, api_delete_section, api_get_organization,
    api_get_section, api_get_selection, api_list_events, api_list_grades, api_list_messages,
    api_list_notifications, api_list_organizations, api_list_sections, api_list_students,
    api_list_teachers, api_login, api_logout, api_marked_dates, api_me, api_post_notification,
    api_remove_admin, api_remove_student, api_remove_teacher, api_send_message,
    api_set_attendance, api_sync_status, api_toggle_attendance, api_update_organization,
    api_update_section, api_update_selection, health,
};
use auth::{SharedAuthenticator, forbidden_api, unauthorized_api};
use config::AttendancePolicy;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use store::EntityStore;
use sync::SyncQueue;
use telemetry::TelemetryFairing;
use tracing::info;

/// Everything the HTTP layer keeps in managed state.
pub struct Console {
    pub pool: SqlitePool,
    pub store: EntityStore,
    pub sync: SyncQueue,
    pub attendance: AttendancePolicy,
    pub authenticator: SharedAuthenticator,
}

pub fn init_rocket(console: Console) -> Rocket<Build> {
    info!("Starting campus console");

    rocket::build()
        .manage(console.pool)
        .manage(console.store)
        .manage(console.sync)
        .manage(console.attendance)
        .manage(console.authenticator)
        .mount(
            "/api",
            routes![
                api_login,
                api_logout,
                api_me,
                api_list_organizations,
                api_create_organization,
                api_get_organization,
                api_update_organization,
                api_add_admin,
                api_remove_admin,
                api_list_grades,
                api_add_grade,
                api_delete_grade,
                api_list_sections,
                api_add_section,
                api_get_section,
                api_update_section,
                api_delete_section,
                api_list_students,
                api_add_student,
                api_remove_student,
                api_list_teachers,
                api_add_teacher,
                api_remove_teacher,
                api_list_events,
                api_marked_dates,
                api_add_event,
                api_delete_event,
                api_set_attendance,
                api_toggle_attendance,
                api_attendance_summary,
                api_attendance_report,
                api_list_notifications,
                api_post_notification,
                api_list_messages,
                api_send_message,
                api_get_selection,
                api_update_selection,
                api_sync_status,
            ],
        )
        .register("/api", catchers![unauthorized_api, forbidden_api])
        .mount("/api", routes![health])
        .attach(TelemetryFairing)
}
