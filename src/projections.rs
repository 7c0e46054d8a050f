//! Read-only views computed from a [`Snapshot`].

use chrono::NaiveDate;
use im::Vector;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{
    AttendanceKey, AttendanceStatus, ChatMessage, Event, Grade, Notification, Organization,
    Section, Student, Teacher,
};
use crate::store::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionView {
    pub organization_id: i64,
    pub grade_id: i64,
    pub section: Section,
    pub teacher: Option<Teacher>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEntry {
    pub student: Student,
    pub status: AttendanceStatus,
}

pub fn organizations_list(snapshot: &Snapshot) -> Vector<Organization> {
    snapshot.organizations.clone()
}

pub fn organization(snapshot: &Snapshot, organization_id: i64) -> Result<Organization, AppError> {
    let index = snapshot.organization_index(organization_id)?;
    Ok(snapshot.organizations[index].clone())
}

pub fn grades_of(snapshot: &Snapshot, organization_id: i64) -> Result<Vector<Grade>, AppError> {
    organization(snapshot, organization_id).map(|o| o.grades)
}

pub fn teachers_of(snapshot: &Snapshot, organization_id: i64) -> Result<Vector<Teacher>, AppError> {
    organization(snapshot, organization_id).map(|o| o.teachers)
}

pub fn sections_of(snapshot: &Snapshot, grade_id: i64) -> Result<Vector<Section>, AppError> {
    let (oi, gi) = snapshot
        .grade_path(grade_id)
        .ok_or_else(|| AppError::not_found("Grade", grade_id))?;
    Ok(snapshot.organizations[oi].grades[gi].sections.clone())
}

fn section(snapshot: &Snapshot, section_id: i64) -> Result<&Section, AppError> {
    let path = snapshot
        .section_path(section_id)
        .ok_or_else(|| AppError::not_found("Section", section_id))?;
    Ok(&snapshot.organizations[path.organization].grades[path.grade].sections[path.section])
}

pub fn students_of(snapshot: &Snapshot, section_id: i64) -> Result<Vector<Student>, AppError> {
    section(snapshot, section_id).map(|s| s.students.clone())
}

/// The section together with the roster entry its `teacher_id` points at.
pub fn section_view(snapshot: &Snapshot, section_id: i64) -> Result<SectionView, AppError> {
    let path = snapshot
        .section_path(section_id)
        .ok_or_else(|| AppError::not_found("Section", section_id))?;
    let org = &snapshot.organizations[path.organization];
    let grade = &org.grades[path.grade];
    let section = grade.sections[path.section].clone();
    let teacher = section.teacher_id.and_then(|id| org.teacher(id)).cloned();

    Ok(SectionView {
        organization_id: org.id,
        grade_id: grade.id,
        section,
        teacher,
    })
}

/// Case-insensitive match on name or roll number. A blank term matches all.
pub fn search_students(
    snapshot: &Snapshot,
    section_id: i64,
    term: &str,
) -> Result<Vector<Student>, AppError> {
    let needle = term.trim().to_lowercase();
    let students = students_of(snapshot, section_id)?;
    if needle.is_empty() {
        return Ok(students);
    }

    Ok(students
        .into_iter()
        .filter(|s| {
            s.name.to_lowercase().contains(&needle) || s.roll_no.to_lowercase().contains(&needle)
        })
        .collect())
}

/// Events scoped to `section_id` plus every global event.
pub fn events_for(snapshot: &Snapshot, section_id: Option<i64>) -> Vector<Event> {
    snapshot
        .events
        .iter()
        .filter(|e| e.section_id.is_none() || e.section_id == section_id)
        .cloned()
        .collect()
}

pub fn events_on(snapshot: &Snapshot, section_id: Option<i64>, date: NaiveDate) -> Vector<Event> {
    events_for(snapshot, section_id)
        .into_iter()
        .filter(|e| e.date == date)
        .collect()
}

pub fn marked_dates(snapshot: &Snapshot) -> Vec<NaiveDate> {
    snapshot.marked_dates.iter().copied().collect()
}

pub fn attendance_summary(
    snapshot: &Snapshot,
    section_id: i64,
    date: NaiveDate,
) -> Result<Vec<AttendanceEntry>, AppError> {
    let section = section(snapshot, section_id)?;

    Ok(section
        .students
        .iter()
        .map(|student| {
            let record = snapshot
                .attendance
                .get(&AttendanceKey::new(&student.roll_no, date))
                .copied();
            AttendanceEntry {
                student: student.clone(),
                status: AttendanceStatus::from_record(record),
            }
        })
        .collect())
}

pub fn notifications(snapshot: &Snapshot) -> Vec<Notification> {
    let mut list: Vec<Notification> = snapshot.notifications.iter().cloned().collect();
    list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
    list
}

pub fn messages(snapshot: &Snapshot) -> Vec<ChatMessage> {
    let mut list: Vec<ChatMessage> = snapshot.messages.iter().cloned().collect();
    list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    list
}

pub fn organization_of_grade(snapshot: &Snapshot, grade_id: i64) -> Option<i64> {
    snapshot
        .grade_path(grade_id)
        .map(|(oi, _)| snapshot.organizations[oi].id)
}

pub fn organization_of_section(snapshot: &Snapshot, section_id: i64) -> Option<i64> {
    snapshot
        .section_path(section_id)
        .map(|p| snapshot.organizations[p.organization].id)
}
