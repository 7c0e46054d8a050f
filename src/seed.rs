use tracing::info;

use crate::error::AppError;
use crate::models::{OrganizationPatch, SectionPatch};
use crate::ops;
use crate::store::Snapshot;

const ROSTER: [(&str, &str); 5] = [
    ("Mr. Brown", "Mathematics"),
    ("Ms. Davis", "Science"),
    ("Mrs. Wilson", "English"),
    ("Mr. Anderson", "History"),
    ("Ms. Thompson", "Physics"),
];

const SECTION_NAMES: [&str; 7] = ["S1", "S2", "S3", "S4", "S5", "C1", "C2"];

struct Contact {
    name: &'static str,
    address: &'static str,
    email: &'static str,
    phone: &'static str,
}

const DIRECTORY: [Contact; 2] = [
    Contact {
        name: "College A",
        address: "123 College St",
        email: "info@collegea.edu",
        phone: "123-456-7890",
    },
    Contact {
        name: "University B",
        address: "456 University Ave",
        email: "info@universityb.edu",
        phone: "987-654-3210",
    },
];

/// Demo colleges for an empty database, built through the regular operations
/// so every id comes from the allocator.
pub fn demo_snapshot() -> Result<Snapshot, AppError> {
    let mut snapshot = Snapshot::default();

    let (next, college) = ops::create_organization(&snapshot, "Mahathma Gandhi Memorial College")?;
    snapshot = next;

    let mut teacher_ids = Vec::new();
    for (name, subject) in ROSTER {
        let (next, teacher) = ops::add_teacher(&snapshot, college.id, name, subject)?;
        snapshot = next;
        teacher_ids.push(teacher.id);
    }

    for grade_name in ["11th Grade", "12th Grade"] {
        let (next, grade) = ops::add_grade(&snapshot, college.id, grade_name)?;
        snapshot = next;

        for (position, section_name) in SECTION_NAMES.iter().enumerate() {
            let (next, section) = ops::add_section(&snapshot, college.id, grade.id)?;
            let patch = SectionPatch {
                name: Some(section_name.to_string()),
                teacher_id: teacher_ids.get(position).copied(),
                ..SectionPatch::default()
            };
            let (next, _) = ops::update_section(&next, section.id, patch)?;
            snapshot = next;
        }
    }

    for contact in DIRECTORY {
        let (next, org) = ops::create_organization(&snapshot, contact.name)?;
        let patch = OrganizationPatch {
            address: Some(contact.address.to_string()),
            email: Some(contact.email.to_string()),
            phone: Some(contact.phone.to_string()),
            ..OrganizationPatch::default()
        };
        let (next, _) = ops::update_organization(&next, org.id, patch)?;
        snapshot = next;

        if contact.name == "College A" {
            let (next, grade) = ops::add_grade(&snapshot, org.id, "Grade 1")?;
            let (next, _) = ops::add_section(&next, org.id, grade.id)?;
            let (next, _) = ops::add_section(&next, org.id, grade.id)?;
            snapshot = next;
        }
    }

    info!(
        organizations = snapshot.organizations.len(),
        "Seeded demo organizations"
    );
    Ok(snapshot)
}
