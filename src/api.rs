use chrono::{NaiveDate, Utc};
use rocket::{Responder, State};
use rocket::http::{Cookie, CookieJar, Header, SameSite, Status};
use rocket::response::status::Custom;
use rocket::serde::{Deserialize, Serialize, json::Json};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{ConsoleUser, Permission, SharedAuthenticator, UserSession};
use crate::config::AttendancePolicy;
use crate::db::{create_user_session, invalidate_session};
use crate::error::AppError;
use crate::models::{
    Audience, ChatMessage, Event, Grade, Notification, Organization, OrganizationPatch, Section,
    SectionPatch, Selection, Student, Teacher,
};
use crate::ops::{self, Outcome};
use crate::projections::{self, AttendanceEntry, SectionView};
use crate::report::AttendanceReport;
use crate::store::{EntityStore, Snapshot};
use crate::sync::{SyncJob, SyncQueue, SyncState, SyncTicket};
use crate::validation::{ApiError, JsonValidateExt, ResultValidateExt, ValidationResponse};

/// Result of a mutation on an organization, with the ticket of the sync job
/// it queued.
#[derive(Serialize, Debug)]
pub struct Mutation<T> {
    pub data: T,
    pub sync: Option<SyncTicket>,
}

impl<T> Mutation<T> {
    fn map<U>(self, f: impl FnOnce(T) -> U) -> Mutation<U> {
        Mutation {
            data: f(self.data),
            sync: self.sync,
        }
    }
}

/// Organization as exposed over the API. The stored password never leaves
/// the server.
#[derive(Serialize, Debug)]
pub struct OrganizationResponse {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub email: String,
    pub phone: String,
    pub image: Option<String>,
    pub username: Option<String>,
    pub has_password: bool,
    pub admins: Vec<String>,
    pub grades: Vec<Grade>,
    pub teachers: Vec<Teacher>,
}

impl From<Organization> for OrganizationResponse {
    fn from(org: Organization) -> Self {
        Self {
            id: org.id,
            name: org.name,
            address: org.address,
            email: org.email,
            phone: org.phone,
            image: org.image,
            username: org.username,
            has_password: org.password.is_some_and(|p| !p.is_empty()),
            admins: org.admins.into_iter().collect(),
            grades: org.grades.into_iter().collect(),
            teachers: org.teachers.into_iter().collect(),
        }
    }
}

fn invalid_date(field: &str) -> ApiError {
    Custom(
        Status::UnprocessableEntity,
        Json(ValidationResponse::with_error(
            field,
            "Dates use the YYYY-MM-DD format",
        )),
    )
}

fn parse_date(value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid_date("date"))
}

/// Applies `op` and queues the resulting state of the organization that
/// `locate` finds in the snapshot the operation started from. The job is
/// queued before the store's writer lock is released, so the sync worker
/// sees organization states in commit order.
pub(crate) fn mutate_organization<T, L, F>(
    store: &EntityStore,
    queue: &SyncQueue,
    locate: L,
    op: F,
) -> Result<Mutation<T>, AppError>
where
    L: FnOnce(&Snapshot) -> Result<i64, AppError>,
    F: FnOnce(&Snapshot) -> Outcome<T>,
{
    store.apply_then(
        |snapshot| {
            let organization_id = locate(snapshot)?;
            let (next, data) = op(snapshot)?;
            let organization = projections::organization(&next, organization_id)?;
            Ok((next, (data, organization)))
        },
        |(data, organization)| Mutation {
            data,
            sync: Some(queue.enqueue(SyncJob::Update(organization))),
        },
    )
}

fn owner_of_section(snapshot: &Snapshot, section_id: i64) -> Result<i64, AppError> {
    projections::organization_of_section(snapshot, section_id)
        .ok_or_else(|| AppError::not_found("Section", section_id))
}

fn owner_of_grade(snapshot: &Snapshot, grade_id: i64) -> Result<i64, AppError> {
    projections::organization_of_grade(snapshot, grade_id)
        .ok_or_else(|| AppError::not_found("Grade", grade_id))
}

#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    password: String,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub user: Option<ConsoleUser>,
    pub error: Option<String>,
}

#[post("/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    authenticator: &State<SharedAuthenticator>,
) -> Result<Json<LoginResponse>, ApiError> {
    let validated = login.validate_custom()?;

    match authenticator
        .authenticate(&validated.email, &validated.password)
        .validate_custom()?
    {
        Some(user) => {
            let token = UserSession::generate_token();
            let expires_at = Utc::now() + chrono::Duration::hours(1);

            create_user_session(db, &user.email, user.role, &token, expires_at.naive_utc())
                .await
                .validate_custom()?;

            let cookie = Cookie::build(("session_token", token))
                .same_site(SameSite::Lax)
                .http_only(true)
                .max_age(rocket::time::Duration::hours(1));
            cookies.add_private(cookie);

            Ok(Json(LoginResponse {
                success: true,
                user: Some(user),
                error: None,
            }))
        }
        None => Ok(Json(LoginResponse {
            success: false,
            user: None,
            error: Some("Invalid email or password".to_string()),
        })),
    }
}

#[post("/logout")]
pub async fn api_logout(cookies: &CookieJar<'_>, db: &State<Pool<Sqlite>>) -> Status {
    let token = cookies
        .get_private("session_token")
        .map(|cookie| cookie.value().to_string());

    if let Some(token) = token {
        if let Err(e) = invalidate_session(db, &token).await {
            e.log_and_record("Logout");
        }
    }

    cookies.remove_private(Cookie::build("session_token"));
    Status::Ok
}

#[get("/me")]
pub fn api_me(user: ConsoleUser) -> Json<ConsoleUser> {
    Json(user)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

#[get("/organizations")]
pub fn api_list_organizations(
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<OrganizationResponse>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let organizations = projections::organizations_list(&store.read())
        .into_iter()
        .map(OrganizationResponse::from)
        .collect();
    Ok(Json(organizations))
}

#[derive(Deserialize, Validate)]
pub struct NameRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    name: String,
}

#[post("/organizations", data = "<request>")]
pub fn api_create_organization(
    request: Json<NameRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Custom<Json<Mutation<OrganizationResponse>>>, ApiError> {
    user.require_permission(Permission::CreateOrganizations)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let (organization, ticket) = store
        .apply_then(
            |s| ops::create_organization(s, &validated.name),
            |organization| {
                let ticket = queue.enqueue(SyncJob::Create(organization.clone()));
                (organization, ticket)
            },
        )
        .validate_custom()?;

    Ok(Custom(
        Status::Created,
        Json(Mutation {
            data: OrganizationResponse::from(organization),
            sync: Some(ticket),
        }),
    ))
}

#[get("/organizations/<id>")]
pub fn api_get_organization(
    id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<OrganizationResponse>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let organization = projections::organization(&store.read(), id).validate_custom()?;
    Ok(Json(organization.into()))
}

fn patch_permissions(patch: &OrganizationPatch) -> Vec<Permission> {
    let mut required = vec![Permission::EditStructure];
    if patch.address.is_some()
        || patch.email.is_some()
        || patch.phone.is_some()
        || patch.username.is_some()
        || patch.password.is_some()
    {
        required.push(Permission::EditOrganizationDetails);
    }
    if patch.admins.is_some() {
        required.push(Permission::ManageAdmins);
    }
    if patch.teachers.is_some() {
        required.push(Permission::ManageTeachers);
    }
    required
}

#[put("/organizations/<id>", data = "<patch>")]
pub fn api_update_organization(
    id: i64,
    patch: Json<OrganizationPatch>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<OrganizationResponse>>, ApiError> {
    let patch = patch.into_inner();
    user.require_all_permissions(&patch_permissions(&patch))
        .validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::update_organization(s, id, patch)
    })
    .validate_custom()?;

    Ok(Json(mutation.map(OrganizationResponse::from)))
}

#[post("/organizations/<id>/admins", data = "<request>")]
pub fn api_add_admin(
    id: i64,
    request: Json<NameRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<Vec<String>>>, ApiError> {
    user.require_permission(Permission::ManageAdmins)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::add_admin(s, id, &validated.name)
    })
    .validate_custom()?;

    Ok(Json(mutation.map(|admins| admins.into_iter().collect())))
}

#[delete("/organizations/<id>/admins/<index>")]
pub fn api_remove_admin(
    id: i64,
    index: usize,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<String>>, ApiError> {
    user.require_permission(Permission::ManageAdmins)
        .validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::remove_admin(s, id, index)
    })
    .validate_custom()?;

    Ok(Json(mutation))
}

#[get("/organizations/<id>/grades")]
pub fn api_list_grades(
    id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<Grade>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let grades = projections::grades_of(&store.read(), id).validate_custom()?;
    Ok(Json(grades.into_iter().collect()))
}

#[post("/organizations/<id>/grades", data = "<request>")]
pub fn api_add_grade(
    id: i64,
    request: Json<NameRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Custom<Json<Mutation<Grade>>>, ApiError> {
    user.require_permission(Permission::EditStructure)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::add_grade(s, id, &validated.name)
    })
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(mutation)))
}

#[delete("/organizations/<id>/grades/<grade_id>")]
pub fn api_delete_grade(
    id: i64,
    grade_id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<Grade>>, ApiError> {
    user.require_permission(Permission::EditStructure)
        .validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::delete_grade(s, id, grade_id)
    })
    .validate_custom()?;

    Ok(Json(mutation))
}

#[get("/grades/<grade_id>/sections")]
pub fn api_list_sections(
    grade_id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<Section>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let sections = projections::sections_of(&store.read(), grade_id).validate_custom()?;
    Ok(Json(sections.into_iter().collect()))
}

#[post("/organizations/<id>/grades/<grade_id>/sections")]
pub fn api_add_section(
    id: i64,
    grade_id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Custom<Json<Mutation<Section>>>, ApiError> {
    user.require_permission(Permission::EditStructure)
        .validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::add_section(s, id, grade_id)
    })
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(mutation)))
}

#[get("/sections/<section_id>")]
pub fn api_get_section(
    section_id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<SectionView>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let view = projections::section_view(&store.read(), section_id).validate_custom()?;
    Ok(Json(view))
}

#[put("/sections/<section_id>", data = "<patch>")]
pub fn api_update_section(
    section_id: i64,
    patch: Json<SectionPatch>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<Section>>, ApiError> {
    let patch = patch.into_inner();
    if patch.students.is_some() {
        user.require_all_permissions(&[Permission::EditStructure, Permission::ManageStudents])
            .validate_custom()?;
    } else {
        user.require_permission(Permission::EditStructure)
            .validate_custom()?;
    }

    let mutation = mutate_organization(
        store,
        queue,
        |s| owner_of_section(s, section_id),
        |s| ops::update_section(s, section_id, patch),
    )
    .validate_custom()?;

    Ok(Json(mutation))
}

#[delete("/grades/<grade_id>/sections/<section_id>")]
pub fn api_delete_section(
    grade_id: i64,
    section_id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<Section>>, ApiError> {
    user.require_permission(Permission::EditStructure)
        .validate_custom()?;

    let mutation = mutate_organization(
        store,
        queue,
        |s| owner_of_grade(s, grade_id),
        |s| ops::delete_section(s, grade_id, section_id),
    )
    .validate_custom()?;

    Ok(Json(mutation))
}

#[get("/sections/<section_id>/students?<search>")]
pub fn api_list_students(
    section_id: i64,
    search: Option<&str>,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<Student>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let snapshot = store.read();
    let students = match search {
        Some(term) => projections::search_students(&snapshot, section_id, term),
        None => projections::students_of(&snapshot, section_id),
    }
    .validate_custom()?;

    Ok(Json(students.into_iter().collect()))
}

#[derive(Deserialize, Validate)]
pub struct StudentRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    name: String,
    #[validate(length(min = 1, max = 50, message = "Roll number is required"))]
    roll_no: String,
}

#[post("/sections/<section_id>/students", data = "<request>")]
pub fn api_add_student(
    section_id: i64,
    request: Json<StudentRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Custom<Json<Mutation<Student>>>, ApiError> {
    user.require_permission(Permission::ManageStudents)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let mutation = mutate_organization(
        store,
        queue,
        |s| owner_of_section(s, section_id),
        |s| ops::add_student(s, section_id, &validated.name, &validated.roll_no),
    )
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(mutation)))
}

#[delete("/sections/<section_id>/students/<student_id>")]
pub fn api_remove_student(
    section_id: i64,
    student_id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<Student>>, ApiError> {
    user.require_permission(Permission::ManageStudents)
        .validate_custom()?;

    let mutation = mutate_organization(
        store,
        queue,
        |s| owner_of_section(s, section_id),
        |s| ops::remove_student(s, section_id, student_id),
    )
    .validate_custom()?;

    Ok(Json(mutation))
}

#[get("/organizations/<id>/teachers")]
pub fn api_list_teachers(
    id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<Teacher>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let teachers = projections::teachers_of(&store.read(), id).validate_custom()?;
    Ok(Json(teachers.into_iter().collect()))
}

#[derive(Deserialize, Validate)]
pub struct TeacherRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    name: String,
    #[validate(length(min = 1, max = 200, message = "Subject is required"))]
    subject: String,
}

#[post("/organizations/<id>/teachers", data = "<request>")]
pub fn api_add_teacher(
    id: i64,
    request: Json<TeacherRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Custom<Json<Mutation<Teacher>>>, ApiError> {
    user.require_permission(Permission::ManageTeachers)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::add_teacher(s, id, &validated.name, &validated.subject)
    })
    .validate_custom()?;

    Ok(Custom(Status::Created, Json(mutation)))
}

#[delete("/organizations/<id>/teachers/<teacher_id>")]
pub fn api_remove_teacher(
    id: i64,
    teacher_id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
    queue: &State<SyncQueue>,
) -> Result<Json<Mutation<Teacher>>, ApiError> {
    user.require_permission(Permission::ManageTeachers)
        .validate_custom()?;

    let mutation = mutate_organization(store, queue, |_| Ok(id), |s| {
        ops::remove_teacher(s, id, teacher_id)
    })
    .validate_custom()?;

    Ok(Json(mutation))
}

#[get("/events?<section>&<date>")]
pub fn api_list_events(
    section: Option<i64>,
    date: Option<&str>,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<Event>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let snapshot = store.read();
    let events = match date {
        Some(date) => projections::events_on(&snapshot, section, parse_date(date)?),
        None => projections::events_for(&snapshot, section),
    };

    Ok(Json(events.into_iter().collect()))
}

#[get("/events/marked-dates")]
pub fn api_marked_dates(
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<NaiveDate>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    Ok(Json(projections::marked_dates(&store.read())))
}

#[derive(Deserialize, Validate)]
pub struct EventRequest {
    #[validate(length(min = 1, max = 200, message = "Event name is required"))]
    name: String,
    date: NaiveDate,
    #[serde(default)]
    section_id: Option<i64>,
}

#[post("/events", data = "<request>")]
pub fn api_add_event(
    request: Json<EventRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Custom<Json<Event>>, ApiError> {
    user.require_permission(Permission::ManageEvents)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let event = store
        .apply(|s| ops::add_event(s, &validated.name, validated.date, validated.section_id))
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(event)))
}

#[delete("/events/<id>")]
pub fn api_delete_event(
    id: i64,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Event>, ApiError> {
    user.require_permission(Permission::ManageEvents)
        .validate_custom()?;

    let event = store
        .apply(|s| ops::delete_event(s, id))
        .validate_custom()?;
    Ok(Json(event))
}

#[derive(Deserialize, Validate)]
pub struct AttendanceRequest {
    #[validate(length(min = 1, message = "Roll number is required"))]
    roll_no: String,
    date: NaiveDate,
    present: bool,
}

#[derive(Deserialize, Validate)]
pub struct ToggleAttendanceRequest {
    #[validate(length(min = 1, message = "Roll number is required"))]
    roll_no: String,
    date: NaiveDate,
}

#[derive(Serialize, Debug)]
pub struct AttendanceResponse {
    pub roll_no: String,
    pub date: NaiveDate,
    pub present: bool,
}

#[put("/attendance", data = "<request>")]
pub fn api_set_attendance(
    request: Json<AttendanceRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    user.require_permission(Permission::RecordAttendance)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let present = store
        .apply(|s| ops::set_attendance(s, &validated.roll_no, validated.date, validated.present))
        .validate_custom()?;

    Ok(Json(AttendanceResponse {
        roll_no: validated.roll_no,
        date: validated.date,
        present,
    }))
}

#[post("/attendance/toggle", data = "<request>")]
pub fn api_toggle_attendance(
    request: Json<ToggleAttendanceRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
    policy: &State<AttendancePolicy>,
) -> Result<Json<AttendanceResponse>, ApiError> {
    user.require_permission(Permission::RecordAttendance)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let present = store
        .apply(|s| {
            ops::toggle_attendance(s, &validated.roll_no, validated.date, policy.inner())
        })
        .validate_custom()?;

    Ok(Json(AttendanceResponse {
        roll_no: validated.roll_no,
        date: validated.date,
        present,
    }))
}

#[get("/sections/<section_id>/attendance?<date>")]
pub fn api_attendance_summary(
    section_id: i64,
    date: &str,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<AttendanceEntry>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let summary = projections::attendance_summary(&store.read(), section_id, parse_date(date)?)
        .validate_custom()?;
    Ok(Json(summary))
}

#[derive(Responder)]
#[response(content_type = "text/csv")]
pub struct CsvDownload {
    body: String,
    disposition: Header<'static>,
}

#[get("/sections/<section_id>/attendance/report?<date>")]
pub fn api_attendance_report(
    section_id: i64,
    date: &str,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<CsvDownload, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    let report =
        AttendanceReport::build(&store.read(), section_id, parse_date(date)?).validate_custom()?;

    Ok(CsvDownload {
        body: report.to_csv(),
        disposition: Header::new(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", report.file_name),
        ),
    })
}

#[get("/notifications")]
pub fn api_list_notifications(
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    Ok(Json(projections::notifications(&store.read())))
}

#[derive(Deserialize, Validate)]
pub struct NotificationRequest {
    #[validate(length(min = 1, max = 2000, message = "Notification content is required"))]
    content: String,
    #[serde(default)]
    audience: Audience,
}

#[post("/notifications", data = "<request>")]
pub fn api_post_notification(
    request: Json<NotificationRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Custom<Json<Notification>>, ApiError> {
    user.require_permission(Permission::Broadcast)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let notification = store
        .apply(|s| {
            ops::post_notification(s, &validated.content, validated.audience, Utc::now())
        })
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(notification)))
}

#[get("/chat")]
pub fn api_list_messages(
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    Ok(Json(projections::messages(&store.read())))
}

#[derive(Deserialize, Validate)]
pub struct MessageRequest {
    #[validate(length(min = 1, max = 2000, message = "Message is required"))]
    content: String,
}

#[post("/chat", data = "<request>")]
pub fn api_send_message(
    request: Json<MessageRequest>,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Custom<Json<ChatMessage>>, ApiError> {
    user.require_permission(Permission::Broadcast)
        .validate_custom()?;
    let validated = request.validate_custom()?;

    let message = store
        .apply(|s| ops::send_message(s, &user.email, &validated.content, Utc::now()))
        .validate_custom()?;

    Ok(Custom(Status::Created, Json(message)))
}

#[get("/selection")]
pub fn api_get_selection(
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Selection>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    Ok(Json(store.read().selection))
}

#[put("/selection", data = "<request>")]
pub fn api_update_selection(
    request: Json<Selection>,
    user: ConsoleUser,
    store: &State<EntityStore>,
) -> Result<Json<Selection>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;
    let wanted = request.into_inner();

    let selection = store
        .apply(|s| ops::select(s, wanted))
        .validate_custom()?;

    Ok(Json(selection))
}

#[get("/sync/<ticket>")]
pub fn api_sync_status(
    ticket: u64,
    user: ConsoleUser,
    queue: &State<SyncQueue>,
) -> Result<Json<SyncState>, ApiError> {
    user.require_permission(Permission::ViewConsole)
        .validate_custom()?;

    queue
        .status(SyncTicket(ticket))
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Sync ticket {} not found", ticket)))
        .validate_custom()
}
