//! User roles for navigation and role-scoped flags
//!
//! Roles are a closed set. A user role the backend sends that we don't
//! recognise resolves to [`Role::Maker`], the general audience, and is logged.
//! Flag definitions parse role names with [`FromStr`] instead, so a typo there
//! never widens who sees a flag.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Roles a signed-in user can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
#[derive(Default)]
pub enum Role {
    /// General maker - the default audience
    #[default]
    Maker,
    /// Offers services through the store
    ServiceProvider,
    /// Publishes learning material
    Educator,
    /// Site staff (internal user)
    Staff,
    /// Catalog and site administration (internal user)
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Maker,
        Role::ServiceProvider,
        Role::Educator,
        Role::Staff,
        Role::Admin,
    ];

    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Maker => "maker",
            Role::ServiceProvider => "service_provider",
            Role::Educator => "educator",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }

    /// Resolve a role string, falling back to [`Role::Maker`] for unknown roles.
    pub fn resolve(raw: &str) -> Role {
        match raw.parse() {
            Ok(role) => role,
            Err(UnknownRole(name)) => {
                warn!(role = %name, "Unknown role, falling back to maker");
                Role::Maker
            }
        }
    }

    /// Whether holders of this role count as internal users for flag rollout
    pub fn is_internal(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role string that doesn't name any [`Role`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "maker" | "general" | "general_maker" => Ok(Role::Maker),
            "service_provider" | "provider" => Ok(Role::ServiceProvider),
            "educator" => Ok(Role::Educator),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        Role::resolve(&raw)
    }
}

/// The primary role of a role list: the first one, or maker when empty
pub fn primary_role(roles: &[Role]) -> Role {
    roles.first().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_roles() {
        assert_eq!("maker".parse::<Role>().unwrap(), Role::Maker);
        assert_eq!(
            "service_provider".parse::<Role>().unwrap(),
            Role::ServiceProvider
        );
        assert_eq!(
            "Service-Provider".parse::<Role>().unwrap(),
            Role::ServiceProvider
        );
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_unknown_role_falls_back_to_maker() {
        assert!("servce_provider".parse::<Role>().is_err());
        assert_eq!(Role::resolve("servce_provider"), Role::Maker);
        assert_eq!(Role::resolve(""), Role::Maker);
    }

    #[test]
    fn test_serde_round_trip_uses_wire_names() {
        let json = serde_json::to_string(&Role::ServiceProvider).unwrap();
        assert_eq!(json, "\"service_provider\"");

        let role: Role = serde_json::from_str("\"educator\"").unwrap();
        assert_eq!(role, Role::Educator);

        let unknown: Role = serde_json::from_str("\"wizard\"").unwrap();
        assert_eq!(unknown, Role::Maker);
    }

    #[test]
    fn test_internal_roles() {
        assert!(Role::Admin.is_internal());
        assert!(Role::Staff.is_internal());
        assert!(!Role::Maker.is_internal());
        assert!(!Role::ServiceProvider.is_internal());
    }

    #[test]
    fn test_primary_role() {
        assert_eq!(primary_role(&[]), Role::Maker);
        assert_eq!(
            primary_role(&[Role::Educator, Role::Admin]),
            Role::Educator
        );
    }
}
