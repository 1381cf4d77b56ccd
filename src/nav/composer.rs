//! Quick actions per role
//!
//! Each role has a fixed, ordered entry table. Composition filters that table
//! by the enabled flag set and by any per-entry role restriction; it never
//! reorders.

use serde::Serialize;

use crate::auth::Role;
use crate::flags::EnabledFlags;

/// Flag keys referenced by the quick-action tables
pub mod flag_keys {
    pub const STORE: &str = "org.links.store";
    pub const LEARN: &str = "org.links.learn";
    pub const FORUM: &str = "org.forum.enabled";
    pub const DIRECTORY: &str = "org.links.directory";
    pub const PRESS: &str = "org.links.press";
    pub const COURSE_AUTHORING: &str = "org.learn.authoring";
    pub const CATALOG_ADMIN: &str = "org.admin.catalog";
}

/// One link or button in the quick-actions list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEntry {
    pub label: &'static str,
    pub route: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_flag_key: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible_for_roles: Option<&'static [Role]>,
}

impl NavigationEntry {
    const fn link(label: &'static str, route: &'static str) -> Self {
        Self {
            label,
            route,
            required_flag_key: None,
            visible_for_roles: None,
        }
    }

    const fn gated(label: &'static str, route: &'static str, flag: &'static str) -> Self {
        Self {
            label,
            route,
            required_flag_key: Some(flag),
            visible_for_roles: None,
        }
    }

    const fn only_for(mut self, roles: &'static [Role]) -> Self {
        self.visible_for_roles = Some(roles);
        self
    }

    /// Whether this entry shows for `role` given the enabled flags
    pub fn is_visible(&self, role: Role, enabled: &EnabledFlags) -> bool {
        let flag_ok = self
            .required_flag_key
            .map_or(true, |key| enabled.contains(key));
        let role_ok = self
            .visible_for_roles
            .map_or(true, |roles| roles.contains(&role));
        flag_ok && role_ok
    }
}

const BROWSE_STORE: NavigationEntry =
    NavigationEntry::gated("Browse Store", "/store", flag_keys::STORE);
const START_LEARNING: NavigationEntry =
    NavigationEntry::gated("Start Learning", "/learn", flag_keys::LEARN);
const JOIN_FORUM: NavigationEntry =
    NavigationEntry::gated("Join the Forum", "/forum", flag_keys::FORUM);

const MAKER: &[NavigationEntry] = &[
    NavigationEntry::link("My Projects", "/dashboard/projects"),
    BROWSE_STORE,
    START_LEARNING,
    JOIN_FORUM,
];

const SERVICE_PROVIDER: &[NavigationEntry] = &[
    NavigationEntry::link("Manage Services", "/dashboard/services"),
    NavigationEntry::gated("Find Makers", "/makers", flag_keys::DIRECTORY),
    BROWSE_STORE,
    NavigationEntry::gated("Press Kit", "/press", flag_keys::PRESS),
];

const EDUCATOR: &[NavigationEntry] = &[
    NavigationEntry::gated("Create a Course", "/learn/new", flag_keys::COURSE_AUTHORING),
    START_LEARNING,
    BROWSE_STORE,
    JOIN_FORUM,
];

const OPERATOR: &[NavigationEntry] = &[
    NavigationEntry::gated("Manage Catalog", "/admin/catalog", flag_keys::CATALOG_ADMIN),
    NavigationEntry::link("Flag Overview", "/admin/flags").only_for(&[Role::Admin]),
    BROWSE_STORE,
    NavigationEntry::link("Contact Inbox", "/admin/contact"),
];

/// The fixed entry table for a role, before filtering
pub fn entries_for(role: Role) -> &'static [NavigationEntry] {
    match role {
        Role::Maker => MAKER,
        Role::ServiceProvider => SERVICE_PROVIDER,
        Role::Educator => EDUCATOR,
        Role::Staff | Role::Admin => OPERATOR,
    }
}

/// Ordered quick actions for `role` with the given flags enabled
pub fn compose_quick_actions(role: Role, enabled: &EnabledFlags) -> Vec<NavigationEntry> {
    entries_for(role)
        .iter()
        .filter(|entry| entry.is_visible(role, enabled))
        .copied()
        .collect()
}

/// Same as [`compose_quick_actions`] for a raw role string.
/// Unknown roles get the general maker set.
pub fn compose_for_role_name(role: &str, enabled: &EnabledFlags) -> Vec<NavigationEntry> {
    compose_quick_actions(Role::resolve(role), enabled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(keys: &[&str]) -> EnabledFlags {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn labels(entries: &[NavigationEntry]) -> Vec<&'static str> {
        entries.iter().map(|e| e.label).collect()
    }

    #[test]
    fn test_service_provider_without_store() {
        let actions = compose_quick_actions(
            Role::ServiceProvider,
            &flags(&[flag_keys::DIRECTORY, flag_keys::PRESS]),
        );
        assert_eq!(labels(&actions), vec!["Manage Services", "Find Makers", "Press Kit"]);
        assert!(actions.iter().all(|e| e.label != "Browse Store"));
    }

    #[test]
    fn test_service_provider_with_store() {
        let actions = compose_quick_actions(Role::ServiceProvider, &flags(&[flag_keys::STORE]));
        assert_eq!(labels(&actions), vec!["Manage Services", "Browse Store"]);
    }

    #[test]
    fn test_maker_order_is_fixed() {
        let all = flags(&[flag_keys::STORE, flag_keys::LEARN, flag_keys::FORUM]);
        assert_eq!(
            labels(&compose_quick_actions(Role::Maker, &all)),
            vec!["My Projects", "Browse Store", "Start Learning", "Join the Forum"]
        );
    }

    #[test]
    fn test_unknown_role_gets_maker_set() {
        let all = flags(&[flag_keys::STORE, flag_keys::LEARN]);
        assert_eq!(
            compose_for_role_name("wizard", &all),
            compose_quick_actions(Role::Maker, &all)
        );
    }

    #[test]
    fn test_visible_for_roles_restricts_entry() {
        let none = EnabledFlags::new();
        let admin = labels(&compose_quick_actions(Role::Admin, &none));
        let staff = labels(&compose_quick_actions(Role::Staff, &none));
        assert!(admin.contains(&"Flag Overview"));
        assert!(!staff.contains(&"Flag Overview"));
        assert!(staff.contains(&"Contact Inbox"));
    }

    #[test]
    fn test_no_flags_keeps_ungated_entries_only() {
        let actions = compose_quick_actions(Role::Educator, &EnabledFlags::new());
        assert!(actions.is_empty());

        let actions = compose_quick_actions(Role::Maker, &EnabledFlags::new());
        assert_eq!(labels(&actions), vec!["My Projects"]);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let json = serde_json::to_value(BROWSE_STORE).unwrap();
        assert_eq!(json["requiredFlagKey"], "org.links.store");
        assert!(json.get("visibleForRoles").is_none());
    }
}
