use chrono::{DateTime, NaiveDate, Utc};
use im::Vector;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub admins: Vector<String>,
    #[serde(default)]
    pub grades: Vector<Grade>,
    #[serde(default)]
    pub teachers: Vector<Teacher>,
}

impl Organization {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            address: String::new(),
            email: String::new(),
            phone: String::new(),
            image: None,
            username: None,
            password: None,
            admins: Vector::new(),
            grades: Vector::new(),
            teachers: Vector::new(),
        }
    }

    pub fn teacher(&self, teacher_id: i64) -> Option<&Teacher> {
        self.teachers.iter().find(|t| t.id == teacher_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub sections: Vector<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub teacher_id: Option<i64>,
    #[serde(default)]
    pub students: Vector<Student>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub roll_no: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: i64,
    pub name: String,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub section_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttendanceKey {
    pub roll_no: String,
    pub date: NaiveDate,
}

impl AttendanceKey {
    pub fn new(roll_no: &str, date: NaiveDate) -> Self {
        Self {
            roll_no: roll_no.to_string(),
            date,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Unmarked,
}

impl AttendanceStatus {
    pub fn from_record(record: Option<bool>) -> Self {
        match record {
            Some(true) => AttendanceStatus::Present,
            Some(false) => AttendanceStatus::Absent,
            None => AttendanceStatus::Unmarked,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Unmarked => "Unmarked",
        }
    }
}

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Audience {
    #[default]
    Everyone,
    Students,
    Teachers,
    Grade(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub content: String,
    pub audience: Audience,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub organization: Option<i64>,
    pub section: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationPatch {
    pub name: Option<String>,
    pub address: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub image: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub admins: Option<Vec<String>>,
    pub grades: Option<Vec<Grade>>,
    pub teachers: Option<Vec<Teacher>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SectionPatch {
    pub name: Option<String>,
    pub teacher_id: Option<i64>,
    #[serde(default)]
    pub clear_teacher: bool,
    pub students: Option<Vec<Student>>,
}

/// Row of the `organizations` sync table.
#[derive(sqlx::FromRow, Clone)]
pub struct DbOrganization {
    pub id: Option<i64>,
    pub body: Option<String>,
}

impl TryFrom<DbOrganization> for Organization {
    type Error = AppError;

    fn try_from(row: DbOrganization) -> Result<Self, Self::Error> {
        let body = row.body.unwrap_or_default();
        let organization: Organization = serde_json::from_str(&body)?;

        if organization.id != row.id.unwrap_or_default() {
            return Err(AppError::Internal(format!(
                "Stored organization {} carries id {}",
                row.id.unwrap_or_default(),
                organization.id
            )));
        }

        Ok(organization)
    }
}
