//! Auth backends: who checks credentials and creates accounts
//!
//! [`LocalAccountBackend`] keeps accounts in a key-value store (Argon2id
//! hashes, HS256 session tokens). [`HttpAuthBackend`] talks to a remote auth API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::jwt::TokenIssuer;
use super::password::{hash_password, password_matches};
use super::roles::Role;
use super::session::{StoredSession, User};
use super::storage::{keys, KeyValueStore, MemoryStore};
use super::validation::ValidRegistration;
use crate::types::{AuthError, GatehouseError};

/// What a backend hands back on successful login or registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGrant {
    pub user: User,
    pub token: String,
    pub refresh_token: Option<String>,
    /// Token lifetime in seconds, if the backend says
    pub expires_in: Option<u64>,
}

impl AuthGrant {
    pub fn into_session(self) -> StoredSession {
        let session = StoredSession::new(self.user, self.token)
            .with_refresh_token(self.refresh_token);
        match self.expires_in {
            Some(secs) => session.expiring_in(secs),
            None => session,
        }
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError>;

    async fn register(&self, registration: &ValidRegistration) -> Result<AuthGrant, AuthError>;
}

#[async_trait]
impl<T: AuthBackend + ?Sized> AuthBackend for Box<T> {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError> {
        (**self).login(email, password).await
    }

    async fn register(&self, registration: &ValidRegistration) -> Result<AuthGrant, AuthError> {
        (**self).register(registration).await
    }
}

// =============================================================================
// Local accounts
// =============================================================================

/// Persisted form of a local account
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRecord {
    user: User,
    password_hash: String,
}

/// Accounts kept in a [`KeyValueStore`], one record per lowercased email
pub struct LocalAccountBackend {
    accounts: Arc<dyn KeyValueStore>,
    issuer: TokenIssuer,
    /// Held across the exists-check and write of a registration
    registering: Mutex<()>,
}

impl LocalAccountBackend {
    /// Accounts that live as long as the process
    pub fn new(issuer: TokenIssuer) -> Self {
        Self::with_store(issuer, Arc::new(MemoryStore::new()))
    }

    /// Accounts persisted in `accounts`
    pub fn with_store(issuer: TokenIssuer, accounts: Arc<dyn KeyValueStore>) -> Self {
        Self {
            accounts,
            issuer,
            registering: Mutex::new(()),
        }
    }

    fn load_account(&self, email: &str) -> Result<Option<AccountRecord>, AuthError> {
        let Some(raw) = self.accounts.get(&keys::account(email))? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthError::Storage(format!("Corrupt account record: {}", e)))
    }

    fn grant_for(&self, user: User) -> Result<AuthGrant, AuthError> {
        let issued = self.issuer.issue(&user)?;
        Ok(AuthGrant {
            user,
            token: issued.token,
            refresh_token: None,
            expires_in: Some(issued.expires_in),
        })
    }
}

#[async_trait]
impl AuthBackend for LocalAccountBackend {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError> {
        let Some(account) = self.load_account(&email.trim().to_ascii_lowercase())? else {
            debug!("Login for unknown account");
            return Err(AuthError::InvalidCredentials);
        };
        if !password_matches(password, &account.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        self.grant_for(account.user.normalized())
    }

    async fn register(&self, registration: &ValidRegistration) -> Result<AuthGrant, AuthError> {
        if self.load_account(&registration.email)?.is_some() {
            return Err(AuthError::AccountExists);
        }

        let mut user = User::new(
            uuid::Uuid::new_v4().to_string(),
            registration.email.clone(),
            vec![registration.role],
        )
        .with_names(&registration.first_name, &registration.last_name);
        user.company = registration.company.clone();

        let record = AccountRecord {
            user: user.clone(),
            password_hash: hash_password(&registration.password)?,
        };
        let json = serde_json::to_string(&record).map_err(GatehouseError::from)?;

        {
            let _guard = self
                .registering
                .lock()
                .map_err(|_| AuthError::Storage("Account lock poisoned".into()))?;
            if self.load_account(&registration.email)?.is_some() {
                return Err(AuthError::AccountExists);
            }
            self.accounts.set(&keys::account(&registration.email), &json)?;
        }

        info!(user_id = %user.id, role = %registration.role, "Registered local account");
        self.grant_for(user)
    }
}

// =============================================================================
// Remote auth API
// =============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    password: &'a str,
    role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    company: Option<&'a str>,
}

/// Response from POST /auth/login and /auth/register
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    user: User,
}

/// Error response from the auth API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    #[allow(dead_code)]
    code: Option<String>,
}

/// HTTP client for a remote auth API
pub struct HttpAuthBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAuthBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, GatehouseError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatehouseError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<AuthGrant, AuthError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Backend(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(match status.as_u16() {
                401 | 403 => AuthError::InvalidCredentials,
                409 => AuthError::AccountExists,
                _ => match serde_json::from_str::<ErrorResponse>(&body) {
                    Ok(err) => AuthError::Backend(format!("{} ({})", err.error, status)),
                    Err(_) => AuthError::Backend(format!("{} ({})", body, status)),
                },
            });
        }

        let parsed: AuthResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Backend(format!("Failed to parse auth response: {}", e)))?;

        Ok(AuthGrant {
            user: parsed.user.normalized(),
            token: parsed.token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in,
        })
    }
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, AuthError> {
        self.post("/auth/login", &LoginRequest { email, password })
            .await
    }

    async fn register(&self, registration: &ValidRegistration) -> Result<AuthGrant, AuthError> {
        let body = RegisterRequest {
            first_name: &registration.first_name,
            last_name: &registration.last_name,
            email: &registration.email,
            password: &registration.password,
            role: registration.role,
            company: registration.company.as_deref(),
        };
        self.post("/auth/register", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FileStore, RegistrationData};

    fn registration(email: &str) -> ValidRegistration {
        RegistrationData {
            first_name: "Ana".into(),
            last_name: "Lima".into(),
            email: email.into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
            role: Some(Role::ServiceProvider),
            company: Some("Lima Works".into()),
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_register_then_login() {
        let backend = LocalAccountBackend::new(TokenIssuer::new_dev());

        let grant = tokio_test::block_on(backend.register(&registration("ana@example.com")))
            .unwrap();
        assert_eq!(grant.user.roles, vec![Role::ServiceProvider]);
        assert_eq!(grant.user.company.as_deref(), Some("Lima Works"));
        assert_eq!(grant.expires_in, Some(3600));

        let login = tokio_test::block_on(backend.login("ANA@example.com ", "secret1")).unwrap();
        assert_eq!(login.user.id, grant.user.id);
    }

    #[test]
    fn test_wrong_password_and_unknown_account() {
        let backend = LocalAccountBackend::new(TokenIssuer::new_dev());
        tokio_test::block_on(backend.register(&registration("ana@example.com"))).unwrap();

        assert_eq!(
            tokio_test::block_on(backend.login("ana@example.com", "nope12")),
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            tokio_test::block_on(backend.login("bo@example.com", "secret1")),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn test_duplicate_registration() {
        let store = MemoryStore::new();
        let backend =
            LocalAccountBackend::with_store(TokenIssuer::new_dev(), Arc::new(store.clone()));
        tokio_test::block_on(backend.register(&registration("ana@example.com"))).unwrap();

        assert_eq!(
            tokio_test::block_on(backend.register(&registration("ANA@example.com"))),
            Err(AuthError::AccountExists)
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_accounts_survive_a_new_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");

        let first = LocalAccountBackend::with_store(
            TokenIssuer::new_dev(),
            Arc::new(FileStore::new(&path)),
        );
        let registered =
            tokio_test::block_on(first.register(&registration("ana@example.com"))).unwrap();

        let second = LocalAccountBackend::with_store(
            TokenIssuer::new_dev(),
            Arc::new(FileStore::new(&path)),
        );
        let login = tokio_test::block_on(second.login("ana@example.com", "secret1")).unwrap();
        assert_eq!(login.user.id, registered.user.id);
        assert_eq!(login.user.roles, vec![Role::ServiceProvider]);

        // Only the hash is written down
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secret1"));
    }

    #[test]
    fn test_corrupt_account_record() {
        let store = MemoryStore::new();
        store.set(&keys::account("ana@example.com"), "{oops").unwrap();
        let backend = LocalAccountBackend::with_store(TokenIssuer::new_dev(), Arc::new(store));

        assert!(matches!(
            tokio_test::block_on(backend.login("ana@example.com", "secret1")),
            Err(AuthError::Storage(_))
        ));
    }

    #[test]
    fn test_grant_into_session() {
        let grant = AuthGrant {
            user: User::new("u1", "a@example.com", vec![]),
            token: "t".into(),
            refresh_token: Some("r".into()),
            expires_in: Some(60),
        };
        let session = grant.into_session();
        assert_eq!(session.refresh_token.as_deref(), Some("r"));
        assert!(session.expires_at.is_some());
        assert!(!session.is_expired());
    }
}
