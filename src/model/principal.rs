use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Actor recorded when no identity source resolves.
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Closed set of roles, assigned once when the principal is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Subadmin,
    User,
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "subadmin" => Ok(Role::Subadmin),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Subadmin => "subadmin",
            Role::User => "user",
        })
    }
}

/// What a request is trying to do to an inventory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    /// Submit a new asset record
    Submit,
    /// Create branches and edit any record or device row
    Edit,
    /// Remove a whole aggregate
    Delete,
}

impl Role {
    pub fn allows(&self, permission: Permission) -> bool {
        match (self, permission) {
            (_, Permission::Read | Permission::Submit) => true,
            (Role::Admin | Role::Subadmin, Permission::Edit) => true,
            (Role::User, Permission::Edit) => false,
            (Role::Admin, Permission::Delete) => true,
            (Role::Subadmin | Role::User, Permission::Delete) => false,
        }
    }
}

/// Verified caller, as handed to the core by the request layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
    pub name: Option<String>,
    pub email: Option<String>,
    pub employee_id: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            name: None,
            email: None,
            employee_id: None,
        }
    }

    pub fn with_details(
        id: String,
        role: Role,
        name: Option<String>,
        email: Option<String>,
        employee_id: Option<String>,
    ) -> Self {
        Self {
            id,
            role,
            name,
            email,
            employee_id,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.role.allows(permission)
    }
}

/// Resolve the identity written into an audit entry.
///
/// Sources are tried in order: an explicit `updatedBy` from the payload,
/// then the principal's employee id, name and email. Blank values are
/// skipped; when nothing resolves the entry is attributed to `SYSTEM`.
pub fn resolve_actor(explicit: Option<&str>, principal: Option<&Principal>) -> String {
    let from_principal = principal.into_iter().flat_map(|p| {
        [
            p.employee_id.as_deref(),
            p.name.as_deref(),
            p.email.as_deref(),
        ]
    });

    std::iter::once(explicit)
        .chain(from_principal)
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(SYSTEM_ACTOR)
        .to_string()
}
