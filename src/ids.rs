//! Identifier allocation.
//!
//! Ids are small positive integers handed out as `max + 1` over the ids
//! already present in a scope. The store additionally feeds the scope's
//! watermark into the candidate set so a deleted id is never handed out again.

use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Returns `max(existing ∪ {0}) + 1`.
pub fn next_id<I>(existing: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    existing.into_iter().fold(0, i64::max) + 1
}

/// Highest id ever issued per scope within the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermarks {
    pub organization: i64,
    pub grade: i64,
    pub section: i64,
    pub student: i64,
    pub event: i64,
    pub notification: i64,
    pub message: i64,
    /// Teacher ids are scoped to their organization.
    pub teachers: OrdMap<i64, i64>,
}

impl Watermarks {
    pub fn teacher(&self, organization_id: i64) -> i64 {
        self.teachers.get(&organization_id).copied().unwrap_or(0)
    }

    pub fn raise_teacher(&mut self, organization_id: i64, id: i64) {
        let current = self.teacher(organization_id);
        if id > current {
            self.teachers.insert(organization_id, id);
        }
    }
}

/// Allocates the next id of a scope, never going below its watermark.
pub fn allocate<I>(existing: I, watermark: i64) -> i64
where
    I: IntoIterator<Item = i64>,
{
    next_id(existing.into_iter().chain(std::iter::once(watermark)))
}
