use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewConsole,
    EditStructure,
    ManageTeachers,
    ManageStudents,
    ManageEvents,
    RecordAttendance,
    Broadcast,

    CreateOrganizations,
    EditOrganizationDetails,
    ManageAdmins,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Principal,
    Admin,
}

static PRINCIPAL_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewConsole);
    permissions.insert(Permission::EditStructure);
    permissions.insert(Permission::ManageTeachers);
    permissions.insert(Permission::ManageStudents);
    permissions.insert(Permission::ManageEvents);
    permissions.insert(Permission::RecordAttendance);
    permissions.insert(Permission::Broadcast);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(PRINCIPAL_PERMISSIONS.iter().copied());

    permissions.insert(Permission::CreateOrganizations);
    permissions.insert(Permission::EditOrganizationDetails);
    permissions.insert(Permission::ManageAdmins);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Principal => &PRINCIPAL_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Principal => "principal",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "principal" => Ok(Role::Principal),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
