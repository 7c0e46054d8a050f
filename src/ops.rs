//! Mutation operations over a [`Snapshot`].
//!
//! Every operation is a pure function from the current snapshot to the next
//! one plus the value the caller asked for. Nothing here touches the store
//! directly; [`EntityStore::apply`](crate::store::EntityStore::apply) commits
//! the result only on success, so a failure never leaves a partial edit
//! behind. Persistent collections make the copy cheap: only the path from the
//! root to the edited node is rebuilt.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use im::Vector;
use tracing::{info, instrument};

use crate::config::AttendancePolicy;
use crate::error::AppError;
use crate::ids::allocate;
use crate::models::{
    AttendanceKey, Audience, ChatMessage, Event, Grade, Notification, Organization,
    OrganizationPatch, Section, SectionPatch, Selection, Student, Teacher,
};
use crate::store::Snapshot;

pub type Outcome<T> = Result<(Snapshot, T), AppError>;

fn require_text(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// `Section A` for the first section of a grade, `Section Z` for the 26th,
/// then `Section AA`, `Section AB`, ...
pub fn section_name(existing: usize) -> String {
    let mut n = existing + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    let suffix: String = letters.into_iter().rev().collect();
    format!("Section {}", suffix)
}

/// Drops everything that hangs off sections that no longer exist: a
/// selection pointing at them and the events scoped to them.
fn forget_sections(next: &mut Snapshot, removed: &[i64]) {
    if removed.is_empty() {
        return;
    }

    if next
        .selection
        .section
        .is_some_and(|selected| removed.contains(&selected))
    {
        next.selection.section = None;
    }

    let before = next.events.len();
    next.events
        .retain(|e| e.section_id.is_none_or(|id| !removed.contains(&id)));
    if next.events.len() != before {
        next.marked_dates = Snapshot::derive_marked_dates(&next.events);
    }
}

fn section_ids_of(grades: &Vector<Grade>) -> Vec<i64> {
    grades
        .iter()
        .flat_map(|g| g.sections.iter().map(|s| s.id))
        .collect()
}

/// Checks one id submitted in a wholesale patch. `0` asks for a fresh id and
/// is always accepted. Any other id must be unique in the patch, unused by
/// other owners, and either present under the patched owner already or above
/// the scope's watermark, so a deleted id cannot come back.
fn check_patched_id(
    kind: &str,
    id: i64,
    seen: &mut HashSet<i64>,
    taken_elsewhere: &HashSet<i64>,
    present: &HashSet<i64>,
    watermark: i64,
) -> Result<(), AppError> {
    if id == 0 {
        return Ok(());
    }
    if id < 0 || !seen.insert(id) || taken_elsewhere.contains(&id) {
        return Err(AppError::Validation(format!(
            "{} id {} is not unique",
            kind, id
        )));
    }
    if id <= watermark && !present.contains(&id) {
        return Err(AppError::Validation(format!(
            "{} id {} was already issued",
            kind, id
        )));
    }
    Ok(())
}

/// Replaces an id of `0` with a fresh one and keeps the watermark current.
fn assign_id(id: &mut i64, used: &mut HashSet<i64>, watermark: &mut i64) {
    if *id == 0 {
        *id = allocate(used.iter().copied(), *watermark);
        used.insert(*id);
    }
    *watermark = (*watermark).max(*id);
}

fn check_students(
    students: &[Student],
    seen: &mut HashSet<i64>,
    taken_elsewhere: &HashSet<i64>,
    present: &HashSet<i64>,
    watermark: i64,
) -> Result<(), AppError> {
    for student in students {
        require_text("student name", &student.name)?;
        require_text("roll number", &student.roll_no)?;
        check_patched_id("Student", student.id, seen, taken_elsewhere, present, watermark)?;
    }
    Ok(())
}

fn number_students(
    students: impl IntoIterator<Item = Student>,
    used: &mut HashSet<i64>,
    watermark: &mut i64,
) -> Vector<Student> {
    students
        .into_iter()
        .map(|mut student| {
            student.name = student.name.trim().to_string();
            student.roll_no = student.roll_no.trim().to_string();
            assign_id(&mut student.id, used, watermark);
            student
        })
        .collect()
}

#[instrument(skip(snapshot))]
pub fn create_organization(snapshot: &Snapshot, name: &str) -> Outcome<Organization> {
    let name = require_text("name", name)?;
    let mut next = snapshot.clone();

    let id = allocate(
        next.organizations.iter().map(|o| o.id),
        next.watermarks.organization,
    );
    let organization = Organization::new(id, &name);
    next.organizations.push_back(organization.clone());
    next.watermarks.organization = id;

    info!(organization_id = id, "Created organization");
    Ok((next, organization))
}

#[instrument(skip(snapshot, patch))]
pub fn update_organization(
    snapshot: &Snapshot,
    organization_id: i64,
    patch: OrganizationPatch,
) -> Outcome<Organization> {
    let index = snapshot.organization_index(organization_id)?;
    let mut next = snapshot.clone();
    let mut org = next.organizations[index].clone();

    if let Some(name) = &patch.name {
        org.name = require_text("name", name)?;
    }
    if let Some(address) = patch.address {
        org.address = address;
    }
    if let Some(email) = patch.email {
        org.email = email;
    }
    if let Some(phone) = patch.phone {
        org.phone = phone;
    }
    if let Some(image) = patch.image {
        org.image = Some(image).filter(|i| !i.trim().is_empty());
    }
    if let Some(username) = patch.username {
        org.username = Some(username);
    }
    if let Some(password) = patch.password {
        org.password = Some(password);
    }
    if let Some(admins) = patch.admins {
        org.admins = admins
            .iter()
            .map(|a| require_text("admin", a))
            .collect::<Result<Vector<_>, _>>()?;
    }

    if let Some(teachers) = patch.teachers {
        let present: HashSet<i64> = org.teachers.iter().map(|t| t.id).collect();
        let mut watermark = next.watermarks.teacher(organization_id);
        let mut seen = HashSet::new();
        for teacher in &teachers {
            require_text("teacher name", &teacher.name)?;
            require_text("subject", &teacher.subject)?;
            check_patched_id(
                "Teacher",
                teacher.id,
                &mut seen,
                &HashSet::new(),
                &present,
                watermark,
            )?;
        }

        let mut used: HashSet<i64> = present.union(&seen).copied().collect();
        let mut roster = Vector::new();
        for mut teacher in teachers {
            teacher.name = teacher.name.trim().to_string();
            teacher.subject = teacher.subject.trim().to_string();
            assign_id(&mut teacher.id, &mut used, &mut watermark);
            roster.push_back(teacher);
        }
        org.teachers = roster;
        next.watermarks.raise_teacher(organization_id, watermark);
    }

    let previous_sections = section_ids_of(&org.grades);
    let grades_patched = patch.grades.is_some();

    if let Some(grades) = patch.grades {
        let others = || {
            snapshot
                .organizations
                .iter()
                .filter(|o| o.id != organization_id)
                .flat_map(|o| o.grades.iter())
        };
        let foreign_grades: HashSet<i64> = others().map(|g| g.id).collect();
        let foreign_sections: HashSet<i64> = others()
            .flat_map(|g| g.sections.iter().map(|s| s.id))
            .collect();
        let foreign_students: HashSet<i64> = others()
            .flat_map(|g| g.sections.iter())
            .flat_map(|s| s.students.iter().map(|st| st.id))
            .collect();

        let present_grades: HashSet<i64> = org.grades.iter().map(|g| g.id).collect();
        let present_sections: HashSet<i64> = previous_sections.iter().copied().collect();
        let present_students: HashSet<i64> = org
            .grades
            .iter()
            .flat_map(|g| g.sections.iter())
            .flat_map(|s| s.students.iter().map(|st| st.id))
            .collect();

        let mut grade_mark = next.watermarks.grade;
        let mut section_mark = next.watermarks.section;
        let mut student_mark = next.watermarks.student;

        let mut grade_ids = HashSet::new();
        let mut section_ids = HashSet::new();
        let mut student_ids = HashSet::new();
        for grade in &grades {
            require_text("grade name", &grade.name)?;
            check_patched_id(
                "Grade",
                grade.id,
                &mut grade_ids,
                &foreign_grades,
                &present_grades,
                grade_mark,
            )?;
            for section in &grade.sections {
                require_text("section name", &section.name)?;
                check_patched_id(
                    "Section",
                    section.id,
                    &mut section_ids,
                    &foreign_sections,
                    &present_sections,
                    section_mark,
                )?;
                let students: Vec<Student> = section.students.iter().cloned().collect();
                check_students(
                    &students,
                    &mut student_ids,
                    &foreign_students,
                    &present_students,
                    student_mark,
                )?;
            }
        }

        let mut used_grades: HashSet<i64> = snapshot.grade_ids().chain(grade_ids).collect();
        let mut used_sections: HashSet<i64> = snapshot.section_ids().chain(section_ids).collect();
        let mut used_students: HashSet<i64> =
            snapshot.student_ids().chain(student_ids).collect();

        let mut patched = Vector::new();
        for mut grade in grades {
            grade.name = grade.name.trim().to_string();
            assign_id(&mut grade.id, &mut used_grades, &mut grade_mark);

            let mut sections = Vector::new();
            for mut section in grade.sections {
                section.name = section.name.trim().to_string();
                assign_id(&mut section.id, &mut used_sections, &mut section_mark);
                section.students =
                    number_students(section.students, &mut used_students, &mut student_mark);
                sections.push_back(section);
            }
            grade.sections = sections;
            patched.push_back(grade);
        }
        org.grades = patched;

        next.watermarks.grade = grade_mark;
        next.watermarks.section = section_mark;
        next.watermarks.student = student_mark;
    }

    let roster: HashSet<i64> = org.teachers.iter().map(|t| t.id).collect();
    let dangling = org
        .grades
        .iter()
        .flat_map(|g| g.sections.iter())
        .filter_map(|s| s.teacher_id)
        .find(|id| !roster.contains(id));
    if let Some(teacher_id) = dangling {
        if grades_patched {
            return Err(AppError::Validation(format!(
                "Teacher {} is not on the roster of organization {}",
                teacher_id, organization_id
            )));
        }
        clear_teacher_references(&mut org, |id| !roster.contains(&id));
    }

    let current_sections = section_ids_of(&org.grades);
    let removed: Vec<i64> = previous_sections
        .into_iter()
        .filter(|id| !current_sections.contains(id))
        .collect();

    next.organizations.set(index, org.clone());
    forget_sections(&mut next, &removed);
    next.raise_watermarks();

    info!(organization_id, "Updated organization");
    Ok((next, org))
}

#[instrument(skip(snapshot))]
pub fn add_grade(snapshot: &Snapshot, organization_id: i64, name: &str) -> Outcome<Grade> {
    let index = snapshot.organization_index(organization_id)?;
    let name = require_text("name", name)?;
    let mut next = snapshot.clone();

    let id = allocate(snapshot.grade_ids(), next.watermarks.grade);
    let grade = Grade {
        id,
        name,
        sections: Vector::new(),
    };

    if let Some(org) = next.organizations.get_mut(index) {
        org.grades.push_back(grade.clone());
    }
    next.watermarks.grade = id;

    info!(organization_id, grade_id = id, "Added grade");
    Ok((next, grade))
}

#[instrument(skip(snapshot))]
pub fn delete_grade(snapshot: &Snapshot, organization_id: i64, grade_id: i64) -> Outcome<Grade> {
    let index = snapshot.organization_index(organization_id)?;
    let position = snapshot.organizations[index]
        .grades
        .iter()
        .position(|g| g.id == grade_id)
        .ok_or_else(|| AppError::not_found("Grade", grade_id))?;

    let mut next = snapshot.clone();
    let removed = match next.organizations.get_mut(index) {
        Some(org) => org.grades.remove(position),
        None => return Err(AppError::not_found("Organization", organization_id)),
    };

    let section_ids: Vec<i64> = removed.sections.iter().map(|s| s.id).collect();
    forget_sections(&mut next, &section_ids);

    info!(
        organization_id,
        grade_id,
        sections = section_ids.len(),
        "Deleted grade"
    );
    Ok((next, removed))
}

#[instrument(skip(snapshot))]
pub fn add_section(snapshot: &Snapshot, organization_id: i64, grade_id: i64) -> Outcome<Section> {
    let index = snapshot.organization_index(organization_id)?;
    let position = snapshot.organizations[index]
        .grades
        .iter()
        .position(|g| g.id == grade_id)
        .ok_or_else(|| AppError::not_found("Grade", grade_id))?;

    let mut next = snapshot.clone();
    let id = allocate(snapshot.section_ids(), next.watermarks.section);

    let section = {
        let grade = next
            .organizations
            .get_mut(index)
            .and_then(|org| org.grades.get_mut(position))
            .ok_or_else(|| AppError::not_found("Grade", grade_id))?;

        let section = Section {
            id,
            name: section_name(grade.sections.len()),
            teacher_id: None,
            students: Vector::new(),
        };
        grade.sections.push_back(section.clone());
        section
    };
    next.watermarks.section = id;

    info!(organization_id, grade_id, section_id = id, "Added section");
    Ok((next, section))
}

#[instrument(skip(snapshot, patch))]
pub fn update_section(snapshot: &Snapshot, section_id: i64, patch: SectionPatch) -> Outcome<Section> {
    let path = snapshot
        .section_path(section_id)
        .ok_or_else(|| AppError::not_found("Section", section_id))?;
    let org = &snapshot.organizations[path.organization];
    let mut section = org.grades[path.grade].sections[path.section].clone();

    if let Some(name) = &patch.name {
        section.name = require_text("name", name)?;
    }

    if patch.clear_teacher {
        section.teacher_id = None;
    } else if let Some(teacher_id) = patch.teacher_id {
        org.teacher(teacher_id)
            .ok_or_else(|| AppError::not_found("Teacher", teacher_id))?;
        section.teacher_id = Some(teacher_id);
    }

    let mut next = snapshot.clone();

    if let Some(students) = patch.students {
        let elsewhere: HashSet<i64> = snapshot
            .organizations
            .iter()
            .flat_map(|o| o.grades.iter())
            .flat_map(|g| g.sections.iter())
            .filter(|s| s.id != section_id)
            .flat_map(|s| s.students.iter().map(|st| st.id))
            .collect();
        let present: HashSet<i64> = section.students.iter().map(|st| st.id).collect();

        let mut watermark = next.watermarks.student;
        let mut seen = HashSet::new();
        check_students(&students, &mut seen, &elsewhere, &present, watermark)?;

        let mut used: HashSet<i64> = snapshot.student_ids().chain(seen).collect();
        section.students = number_students(students, &mut used, &mut watermark);
        next.watermarks.student = watermark;
    }

    if let Some(slot) = next
        .organizations
        .get_mut(path.organization)
        .and_then(|o| o.grades.get_mut(path.grade))
        .and_then(|g| g.sections.get_mut(path.section))
    {
        *slot = section.clone();
    }

    info!(section_id, "Updated section");
    Ok((next, section))
}

#[instrument(skip(snapshot))]
pub fn delete_section(snapshot: &Snapshot, grade_id: i64, section_id: i64) -> Outcome<Section> {
    let (oi, gi) = snapshot
        .grade_path(grade_id)
        .ok_or_else(|| AppError::not_found("Grade", grade_id))?;
    let position = snapshot.organizations[oi].grades[gi]
        .sections
        .iter()
        .position(|s| s.id == section_id)
        .ok_or_else(|| AppError::not_found("Section", section_id))?;

    let mut next = snapshot.clone();
    let removed = next
        .organizations
        .get_mut(oi)
        .and_then(|o| o.grades.get_mut(gi))
        .map(|g| g.sections.remove(position))
        .ok_or_else(|| AppError::not_found("Grade", grade_id))?;

    forget_sections(&mut next, &[section_id]);

    info!(
        grade_id,
        section_id,
        students = removed.students.len(),
        "Deleted section"
    );
    Ok((next, removed))
}

#[instrument(skip(snapshot))]
pub fn add_student(
    snapshot: &Snapshot,
    section_id: i64,
    name: &str,
    roll_no: &str,
) -> Outcome<Student> {
    let path = snapshot
        .section_path(section_id)
        .ok_or_else(|| AppError::not_found("Section", section_id))?;
    let student = Student {
        id: allocate(snapshot.student_ids(), snapshot.watermarks.student),
        name: require_text("name", name)?,
        roll_no: require_text("roll number", roll_no)?,
    };

    let mut next = snapshot.clone();
    if let Some(section) = next
        .organizations
        .get_mut(path.organization)
        .and_then(|o| o.grades.get_mut(path.grade))
        .and_then(|g| g.sections.get_mut(path.section))
    {
        section.students.push_back(student.clone());
    }
    next.watermarks.student = student.id;

    info!(section_id, student_id = student.id, "Added student");
    Ok((next, student))
}

#[instrument(skip(snapshot))]
pub fn remove_student(snapshot: &Snapshot, section_id: i64, student_id: i64) -> Outcome<Student> {
    let path = snapshot
        .section_path(section_id)
        .ok_or_else(|| AppError::not_found("Section", section_id))?;
    let position = snapshot.organizations[path.organization].grades[path.grade].sections
        [path.section]
        .students
        .iter()
        .position(|s| s.id == student_id)
        .ok_or_else(|| AppError::not_found("Student", student_id))?;

    let mut next = snapshot.clone();
    let removed = next
        .organizations
        .get_mut(path.organization)
        .and_then(|o| o.grades.get_mut(path.grade))
        .and_then(|g| g.sections.get_mut(path.section))
        .map(|s| s.students.remove(position))
        .ok_or_else(|| AppError::not_found("Section", section_id))?;

    info!(section_id, student_id, "Removed student");
    Ok((next, removed))
}

#[instrument(skip(snapshot))]
pub fn add_admin(snapshot: &Snapshot, organization_id: i64, name: &str) -> Outcome<Vector<String>> {
    let index = snapshot.organization_index(organization_id)?;
    let name = require_text("admin", name)?;
    let mut next = snapshot.clone();

    let admins = match next.organizations.get_mut(index) {
        Some(org) => {
            org.admins.push_back(name);
            org.admins.clone()
        }
        None => return Err(AppError::not_found("Organization", organization_id)),
    };

    info!(organization_id, "Added admin");
    Ok((next, admins))
}

#[instrument(skip(snapshot))]
pub fn remove_admin(snapshot: &Snapshot, organization_id: i64, index: usize) -> Outcome<String> {
    let org_index = snapshot.organization_index(organization_id)?;
    let count = snapshot.organizations[org_index].admins.len();
    if index >= count {
        return Err(AppError::OutOfRange(format!(
            "Admin index {} is out of range for {} admins",
            index, count
        )));
    }

    let mut next = snapshot.clone();
    let removed = match next.organizations.get_mut(org_index) {
        Some(org) => org.admins.remove(index),
        None => return Err(AppError::not_found("Organization", organization_id)),
    };

    info!(organization_id, index, "Removed admin");
    Ok((next, removed))
}

#[instrument(skip(snapshot))]
pub fn add_teacher(
    snapshot: &Snapshot,
    organization_id: i64,
    name: &str,
    subject: &str,
) -> Outcome<Teacher> {
    let index = snapshot.organization_index(organization_id)?;
    let name = require_text("name", name)?;
    let subject = require_text("subject", subject)?;
    let mut next = snapshot.clone();

    let teacher = Teacher {
        id: allocate(
            snapshot.organizations[index].teachers.iter().map(|t| t.id),
            snapshot.watermarks.teacher(organization_id),
        ),
        name,
        subject,
    };
    if let Some(org) = next.organizations.get_mut(index) {
        org.teachers.push_back(teacher.clone());
    }
    next.watermarks.raise_teacher(organization_id, teacher.id);

    info!(organization_id, teacher_id = teacher.id, "Added teacher");
    Ok((next, teacher))
}

fn clear_teacher_references<F>(org: &mut Organization, matches: F)
where
    F: Fn(i64) -> bool,
{
    let matches = &matches;
    let affected: Vec<(usize, usize)> = org
        .grades
        .iter()
        .enumerate()
        .flat_map(|(gi, g)| {
            g.sections
                .iter()
                .enumerate()
                .filter(move |(_, s)| s.teacher_id.is_some_and(matches))
                .map(move |(si, _)| (gi, si))
        })
        .collect();

    for (gi, si) in affected {
        if let Some(section) = org
            .grades
            .get_mut(gi)
            .and_then(|g| g.sections.get_mut(si))
        {
            section.teacher_id = None;
        }
    }
}

#[instrument(skip(snapshot))]
pub fn remove_teacher(snapshot: &Snapshot, organization_id: i64, teacher_id: i64) -> Outcome<Teacher> {
    let index = snapshot.organization_index(organization_id)?;
    let position = snapshot.organizations[index]
        .teachers
        .iter()
        .position(|t| t.id == teacher_id)
        .ok_or_else(|| AppError::not_found("Teacher", teacher_id))?;

    let mut next = snapshot.clone();
    let removed = match next.organizations.get_mut(index) {
        Some(org) => {
            let removed = org.teachers.remove(position);
            clear_teacher_references(org, |id| id == teacher_id);
            removed
        }
        None => return Err(AppError::not_found("Organization", organization_id)),
    };

    info!(organization_id, teacher_id, "Removed teacher");
    Ok((next, removed))
}

#[instrument(skip(snapshot))]
pub fn add_event(
    snapshot: &Snapshot,
    name: &str,
    date: NaiveDate,
    section_id: Option<i64>,
) -> Outcome<Event> {
    let name = require_text("name", name)?;
    if let Some(section_id) = section_id {
        snapshot
            .section_path(section_id)
            .ok_or_else(|| AppError::not_found("Section", section_id))?;
    }

    let mut next = snapshot.clone();
    let event = Event {
        id: allocate(next.events.iter().map(|e| e.id), next.watermarks.event),
        name,
        date,
        section_id,
    };
    next.events.push_back(event.clone());
    next.marked_dates.insert(date);
    next.watermarks.event = event.id;

    info!(event_id = event.id, %date, "Added event");
    Ok((next, event))
}

#[instrument(skip(snapshot))]
pub fn delete_event(snapshot: &Snapshot, event_id: i64) -> Outcome<Event> {
    let position = snapshot
        .events
        .iter()
        .position(|e| e.id == event_id)
        .ok_or_else(|| AppError::not_found("Event", event_id))?;

    let mut next = snapshot.clone();
    let removed = next.events.remove(position);
    if !next.events.iter().any(|e| e.date == removed.date) {
        next.marked_dates.remove(&removed.date);
    }

    info!(event_id, date = %removed.date, "Deleted event");
    Ok((next, removed))
}

#[instrument(skip(snapshot))]
pub fn set_attendance(
    snapshot: &Snapshot,
    roll_no: &str,
    date: NaiveDate,
    present: bool,
) -> Outcome<bool> {
    let mut next = snapshot.clone();
    next.attendance
        .insert(AttendanceKey::new(roll_no, date), present);
    Ok((next, present))
}

/// Flips a student's presence for a day. A day nobody recorded yet starts
/// from the policy's default presence; without one the toggle is refused.
#[instrument(skip(snapshot))]
pub fn toggle_attendance(
    snapshot: &Snapshot,
    roll_no: &str,
    date: NaiveDate,
    policy: &AttendancePolicy,
) -> Outcome<bool> {
    let key = AttendanceKey::new(roll_no, date);
    let current = snapshot
        .attendance
        .get(&key)
        .copied()
        .or(policy.default_presence)
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No attendance recorded for {} on {}",
                roll_no, date
            ))
        })?;

    let mut next = snapshot.clone();
    next.attendance.insert(key, !current);
    Ok((next, !current))
}

#[instrument(skip(snapshot, content))]
pub fn post_notification(
    snapshot: &Snapshot,
    content: &str,
    audience: Audience,
    at: DateTime<Utc>,
) -> Outcome<Notification> {
    let content = require_text("content", content)?;
    if let Audience::Grade(grade_id) = audience {
        snapshot
            .grade_path(grade_id)
            .ok_or_else(|| AppError::not_found("Grade", grade_id))?;
    }

    let mut next = snapshot.clone();
    let notification = Notification {
        id: allocate(
            next.notifications.iter().map(|n| n.id),
            next.watermarks.notification,
        ),
        content,
        audience,
        timestamp: at,
    };
    next.notifications.push_back(notification.clone());
    next.watermarks.notification = notification.id;

    info!(notification_id = notification.id, "Posted notification");
    Ok((next, notification))
}

#[instrument(skip(snapshot, content))]
pub fn send_message(
    snapshot: &Snapshot,
    sender: &str,
    content: &str,
    at: DateTime<Utc>,
) -> Outcome<ChatMessage> {
    let sender = require_text("sender", sender)?;
    let content = require_text("content", content)?;

    let mut next = snapshot.clone();
    let message = ChatMessage {
        id: allocate(next.messages.iter().map(|m| m.id), next.watermarks.message),
        sender,
        content,
        timestamp: at,
    };
    next.messages.push_back(message.clone());
    next.watermarks.message = message.id;

    Ok((next, message))
}

#[instrument(skip(snapshot))]
pub fn select_organization(snapshot: &Snapshot, organization_id: Option<i64>) -> Outcome<()> {
    let mut next = snapshot.clone();

    match organization_id {
        Some(id) => {
            let index = snapshot.organization_index(id)?;
            let keeps_section = next.selection.section.is_some_and(|section_id| {
                snapshot
                    .section_path(section_id)
                    .is_some_and(|p| p.organization == index)
            });
            if !keeps_section {
                next.selection.section = None;
            }
            next.selection.organization = Some(id);
        }
        None => {
            next.selection.organization = None;
            next.selection.section = None;
        }
    }

    Ok((next, ()))
}

#[instrument(skip(snapshot))]
pub fn select_section(snapshot: &Snapshot, section_id: Option<i64>) -> Outcome<()> {
    let mut next = snapshot.clone();

    match section_id {
        Some(id) => {
            let path = snapshot
                .section_path(id)
                .ok_or_else(|| AppError::not_found("Section", id))?;
            next.selection.section = Some(id);
            next.selection.organization = Some(snapshot.organizations[path.organization].id);
        }
        None => next.selection.section = None,
    }

    Ok((next, ()))
}

/// Replaces the whole selection. A section must belong to the organization
/// selected alongside it.
#[instrument(skip(snapshot))]
pub fn select(snapshot: &Snapshot, wanted: Selection) -> Outcome<Selection> {
    if let (Some(organization_id), Some(section_id)) = (wanted.organization, wanted.section) {
        snapshot.organization_index(organization_id)?;
        let path = snapshot
            .section_path(section_id)
            .ok_or_else(|| AppError::not_found("Section", section_id))?;
        if snapshot.organizations[path.organization].id != organization_id {
            return Err(AppError::Validation(format!(
                "Section {} does not belong to organization {}",
                section_id, organization_id
            )));
        }
    }

    let (next, ()) = select_organization(snapshot, wanted.organization)?;
    let (next, ()) = select_section(&next, wanted.section)?;
    let selection = next.selection;

    info!(?selection, "Updated selection");
    Ok((next, selection))
}
