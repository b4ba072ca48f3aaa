//! Role hierarchy: a total order over roles expressed as integer levels.
//!
//! Both route gating and service-level filtering go through [`satisfies`] and
//! [`assignable_roles`]; nothing else compares roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Level given to role strings that match no known role.
pub const UNKNOWN_ROLE_LEVEL: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    TenantAdmin,
    Manager,
    Employee,
    Guest,
}

impl Role {
    /// Every role, highest level first.
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::TenantAdmin,
        Role::Manager,
        Role::Employee,
        Role::Guest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::TenantAdmin => "tenant_admin",
            Role::Manager => "manager",
            Role::Employee => "employee",
            Role::Guest => "guest",
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Role::SuperAdmin => 100,
            Role::TenantAdmin => 80,
            Role::Manager => 60,
            Role::Employee => 40,
            Role::Guest => 20,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Level of a stored or asserted role string.
pub fn role_level(role: &str) -> u8 {
    role.parse::<Role>()
        .map(|r| r.level())
        .unwrap_or(UNKNOWN_ROLE_LEVEL)
}

/// True iff `actual` sits at or above `required` in the hierarchy.
pub fn satisfies(actual: &str, required: Role) -> bool {
    role_level(actual) >= required.level()
}

/// Roles an actor may grant to others: strictly below the actor's own level.
pub fn assignable_roles(actor: &str) -> Vec<Role> {
    let level = role_level(actor);
    Role::ALL
        .into_iter()
        .filter(|r| r.level() < level)
        .collect()
}
