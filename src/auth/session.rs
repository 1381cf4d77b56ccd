//! Signed-in user and the persisted session around it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::roles::{primary_role, Role};

/// The signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    /// Never empty; see [`User::new`]
    pub roles: Vec<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

impl User {
    /// Create a user. An empty role list becomes `[maker]`.
    pub fn new(id: impl Into<String>, email: impl Into<String>, roles: Vec<Role>) -> Self {
        let roles = if roles.is_empty() {
            vec![Role::Maker]
        } else {
            roles
        };

        Self {
            id: id.into(),
            email: email.into(),
            roles,
            first_name: None,
            last_name: None,
            display_name: None,
            company: None,
        }
    }

    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }

    pub fn primary_role(&self) -> Role {
        primary_role(&self.roles)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Restore the non-empty roles invariant after deserializing foreign data
    pub(crate) fn normalized(mut self) -> Self {
        if self.roles.is_empty() {
            self.roles.push(Role::Maker);
        }
        self
    }
}

/// Everything persisted for a signed-in session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub user: User,
    /// Bearer token for API calls
    pub token: String,
    pub refresh_token: Option<String>,
    /// When `token` stops being valid, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredSession {
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Expiry from an OAuth-style `expires_in` (seconds from now). A lifetime
    /// past what a timestamp can hold leaves the expiry unknown.
    pub fn expiring_in(self, expires_in: u64) -> Self {
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        self.with_expires_at(expires_at)
    }

    /// Whether the token is past its expiry at `now`. Unknown expiry never expires.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|exp| exp <= now).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_always_has_a_role() {
        let user = User::new("u1", "a@example.com", vec![]);
        assert_eq!(user.roles, vec![Role::Maker]);
        assert_eq!(user.primary_role(), Role::Maker);
    }

    #[test]
    fn test_user_json_shape() {
        let user = User::new("u1", "ana@example.com", vec![Role::ServiceProvider])
            .with_names("Ana", "Lima");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["firstName"], "Ana");
        assert_eq!(json["roles"][0], "service_provider");
        assert!(json.get("company").is_none());
    }

    #[test]
    fn test_normalized_fills_empty_roles() {
        let user: User =
            serde_json::from_str(r#"{"id":"u1","email":"a@b.co","roles":[]}"#).unwrap();
        assert_eq!(user.normalized().roles, vec![Role::Maker]);
    }

    #[test]
    fn test_expiry() {
        let user = User::new("u1", "a@example.com", vec![Role::Maker]);
        let now = Utc::now();

        let open = StoredSession::new(user.clone(), "t");
        assert!(!open.is_expired_at(now));

        let past = StoredSession::new(user.clone(), "t")
            .with_expires_at(Some(now - chrono::Duration::seconds(1)));
        assert!(past.is_expired_at(now));

        let future = StoredSession::new(user, "t").expiring_in(3600);
        assert!(!future.is_expired());
    }

    #[test]
    fn test_unrepresentable_lifetime_leaves_expiry_unknown() {
        let user = User::new("u1", "a@example.com", vec![Role::Maker]);
        for lifetime in [u64::MAX, 10_000_000_000_000_000, i64::MAX as u64] {
            let session = StoredSession::new(user.clone(), "t").expiring_in(lifetime);
            assert_eq!(session.expires_at, None);
            assert!(!session.is_expired());
        }
    }
}
