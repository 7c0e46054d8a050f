use std::sync::{Arc, Mutex, RwLock};

use chrono::NaiveDate;
use im::{OrdMap, OrdSet, Vector};
use tracing::{debug, instrument};

use crate::error::AppError;
use crate::ids::Watermarks;
use crate::models::{AttendanceKey, ChatMessage, Event, Notification, Organization, Selection};

/// One immutable state of the whole console.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub organizations: Vector<Organization>,
    pub events: Vector<Event>,
    pub marked_dates: OrdSet<NaiveDate>,
    pub attendance: OrdMap<AttendanceKey, bool>,
    pub notifications: Vector<Notification>,
    pub messages: Vector<ChatMessage>,
    pub selection: Selection,
    pub watermarks: Watermarks,
}

/// Indexes of a section inside `Snapshot::organizations`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionPath {
    pub organization: usize,
    pub grade: usize,
    pub section: usize,
}

impl Snapshot {
    /// Builds a snapshot around already-existing organizations, raising the
    /// watermarks past every id they carry.
    pub fn from_organizations<I>(organizations: I) -> Self
    where
        I: IntoIterator<Item = Organization>,
    {
        let mut snapshot = Snapshot {
            organizations: organizations.into_iter().collect(),
            ..Snapshot::default()
        };
        snapshot.raise_watermarks();
        snapshot
    }

    pub(crate) fn raise_watermarks(&mut self) {
        let mut marks = self.watermarks.clone();

        for org in &self.organizations {
            marks.organization = marks.organization.max(org.id);
            for teacher in &org.teachers {
                marks.raise_teacher(org.id, teacher.id);
            }
            for grade in &org.grades {
                marks.grade = marks.grade.max(grade.id);
                for section in &grade.sections {
                    marks.section = marks.section.max(section.id);
                    for student in &section.students {
                        marks.student = marks.student.max(student.id);
                    }
                }
            }
        }
        for event in &self.events {
            marks.event = marks.event.max(event.id);
        }
        for notification in &self.notifications {
            marks.notification = marks.notification.max(notification.id);
        }
        for message in &self.messages {
            marks.message = marks.message.max(message.id);
        }

        self.watermarks = marks;
    }

    pub fn organization_index(&self, organization_id: i64) -> Result<usize, AppError> {
        self.organizations
            .iter()
            .position(|o| o.id == organization_id)
            .ok_or_else(|| AppError::not_found("Organization", organization_id))
    }

    pub fn grade_path(&self, grade_id: i64) -> Option<(usize, usize)> {
        self.organizations
            .iter()
            .enumerate()
            .find_map(|(oi, org)| {
                org.grades
                    .iter()
                    .position(|g| g.id == grade_id)
                    .map(|gi| (oi, gi))
            })
    }

    pub fn section_path(&self, section_id: i64) -> Option<SectionPath> {
        for (oi, org) in self.organizations.iter().enumerate() {
            for (gi, grade) in org.grades.iter().enumerate() {
                if let Some(si) = grade.sections.iter().position(|s| s.id == section_id) {
                    return Some(SectionPath {
                        organization: oi,
                        grade: gi,
                        section: si,
                    });
                }
            }
        }
        None
    }

    pub fn grade_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.organizations
            .iter()
            .flat_map(|o| o.grades.iter().map(|g| g.id))
    }

    pub fn section_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.organizations
            .iter()
            .flat_map(|o| o.grades.iter())
            .flat_map(|g| g.sections.iter().map(|s| s.id))
    }

    pub fn student_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.organizations
            .iter()
            .flat_map(|o| o.grades.iter())
            .flat_map(|g| g.sections.iter())
            .flat_map(|s| s.students.iter().map(|st| st.id))
    }

    /// Recomputes the marked-date index from the event list.
    pub fn derive_marked_dates(events: &Vector<Event>) -> OrdSet<NaiveDate> {
        events.iter().map(|e| e.date).collect()
    }
}

/// Holder of the canonical snapshot.
///
/// Readers clone the current `Arc` and never observe a half-applied
/// mutation. Writers are serialised through `writer` for the whole
/// compute-and-commit step.
#[derive(Debug, Default)]
pub struct EntityStore {
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl EntityStore {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }

    pub fn read(&self) -> Arc<Snapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn commit(&self, snapshot: Snapshot) {
        let next = Arc::new(snapshot);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Runs a mutation against the latest snapshot and commits its result.
    /// A failing mutation leaves the store untouched.
    pub fn apply<T, F>(&self, op: F) -> Result<T, AppError>
    where
        F: FnOnce(&Snapshot) -> Result<(Snapshot, T), AppError>,
    {
        self.apply_then(op, |value| value)
    }

    /// Like [`apply`](Self::apply), then hands the result to `after` before
    /// the writer lock is released. Side effects run in `after` are ordered
    /// exactly like the commits that produced them.
    #[instrument(skip_all)]
    pub fn apply_then<T, U, F, A>(&self, op: F, after: A) -> Result<U, AppError>
    where
        F: FnOnce(&Snapshot) -> Result<(Snapshot, T), AppError>,
        A: FnOnce(T) -> U,
    {
        let _writer = self
            .writer
            .lock()
            .map_err(|_| AppError::Internal("Store writer lock poisoned".to_string()))?;

        let current = self.read();
        let (next, value) = op(&current)?;
        self.commit(next);
        debug!("Committed new snapshot");

        Ok(after(value))
    }
}
