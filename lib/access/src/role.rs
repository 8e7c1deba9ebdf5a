//! Role types for access control.
//!
//! Roles travel inside access tokens and are re-read on every request.
//! A role set is never empty: anything that would produce an empty set
//! yields the default `{user}` instead.

use serde::{Deserialize, Serialize};

/// Role granted to a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrator with access to user management.
    Admin,
    /// Standard user.
    User,
    /// Restricted visitor.
    Guest,
}

impl Role {
    /// Returns true if this role has admin privileges.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Guest => "guest",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-empty set of roles held by a principal.
///
/// Serialized as a plain list, e.g. `["user", "admin"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    /// Creates a role set from a list, dropping duplicates.
    ///
    /// An empty list yields the default `{user}` set.
    #[must_use]
    pub fn new(roles: impl IntoIterator<Item = Role>) -> Self {
        let mut unique = Vec::new();
        for role in roles {
            if !unique.contains(&role) {
                unique.push(role);
            }
        }
        if unique.is_empty() {
            return Self::user();
        }
        Self { roles: unique }
    }

    /// Creates the default role set, `{user}`.
    #[must_use]
    pub fn user() -> Self {
        Self {
            roles: vec![Role::User],
        }
    }

    /// Creates a role set with only admin.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            roles: vec![Role::Admin],
        }
    }

    /// Returns true if the set contains `role`.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns true if any role in the set is also in `allowed`.
    #[must_use]
    pub fn intersects(&self, allowed: &[Role]) -> bool {
        self.roles.iter().any(|role| allowed.contains(role))
    }

    /// Returns true if the set grants admin access.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Returns the roles as a slice.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl Default for RoleSet {
    fn default() -> Self {
        Self::user()
    }
}

impl From<Vec<Role>> for RoleSet {
    fn from(roles: Vec<Role>) -> Self {
        Self::new(roles)
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(set: RoleSet) -> Self {
        set.roles
    }
}
