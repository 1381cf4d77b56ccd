//! Auth context: the session state machine
//!
//! ```text
//! Uninitialized --restore()--> Restoring --> Authenticated | Anonymous
//! Anonymous --login()/register() ok--> Authenticated
//! Authenticated --logout()--> Anonymous
//! ```
//!
//! The context is the only writer of session state. Every operation takes
//! `&mut self` and writes state only after its backend call has completed, so
//! dropping an in-flight `login`/`register` future leaves the context as it was.

use std::fmt;
use tracing::{debug, info, warn};

use super::backend::{AuthBackend, AuthGrant};
use super::session::{StoredSession, User};
use super::storage::SessionStorage;
use super::validation::RegistrationData;
use crate::types::AuthError;

/// Where the context is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Restoring,
    Authenticated(StoredSession),
    Anonymous,
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::Uninitialized => "uninitialized",
            AuthState::Restoring => "restoring",
            AuthState::Authenticated(_) => "authenticated",
            AuthState::Anonymous => "anonymous",
        }
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Session expiry handling on restore
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// A stored session past its `expires_at` is discarded
    #[default]
    Enforce,
    /// Stored sessions are trusted until logout
    Ignore,
}

pub struct AuthContext<S, B> {
    state: AuthState,
    storage: S,
    backend: B,
    expiry: ExpiryPolicy,
}

impl<S: SessionStorage, B: AuthBackend> AuthContext<S, B> {
    pub fn new(storage: S, backend: B) -> Self {
        Self {
            state: AuthState::Uninitialized,
            storage,
            backend,
            expiry: ExpiryPolicy::default(),
        }
    }

    pub fn with_expiry_policy(mut self, policy: ExpiryPolicy) -> Self {
        self.expiry = policy;
        self
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            AuthState::Authenticated(session) => Some(&session.user),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<&StoredSession> {
        match &self.state {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// Derived from the user; there is no separate flag to get out of sync
    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read the persisted session. Unreadable or expired sessions are cleared
    /// and leave the context anonymous.
    pub fn restore(&mut self) -> &AuthState {
        self.state = AuthState::Restoring;

        let restored = match self.storage.load_session() {
            Ok(Some(session)) => {
                if self.expiry == ExpiryPolicy::Enforce && session.is_expired() {
                    info!(user_id = %session.user.id, "Stored session expired, signing out");
                    self.clear_storage();
                    None
                } else {
                    Some(session)
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Discarding unreadable stored session: {}", e);
                self.clear_storage();
                None
            }
        };

        self.state = match restored {
            Some(session) => {
                debug!(user_id = %session.user.id, "Session restored");
                AuthState::Authenticated(session)
            }
            None => AuthState::Anonymous,
        };
        &self.state
    }

    /// Sign in. On failure the context stays (or becomes) anonymous.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<&User, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            self.settle_anonymous();
            return Err(AuthError::InvalidCredentials);
        }

        match self.backend.login(email, password).await {
            Ok(grant) => self.establish(grant),
            Err(e) => {
                info!("Login failed: {}", e);
                self.settle_anonymous();
                Err(e)
            }
        }
    }

    /// Validate the form, then create the account and sign in.
    /// Validation problems come back per field and never reach the backend.
    pub async fn register(&mut self, data: &RegistrationData) -> Result<&User, AuthError> {
        let registration = match data.validate() {
            Ok(valid) => valid,
            Err(errors) => {
                self.settle_anonymous();
                return Err(AuthError::Validation(errors));
            }
        };

        match self.backend.register(&registration).await {
            Ok(grant) => self.establish(grant),
            Err(e) => {
                info!("Registration failed: {}", e);
                self.settle_anonymous();
                Err(e)
            }
        }
    }

    /// Sign out. Always ends anonymous; storage faults are only logged.
    pub fn logout(&mut self) {
        if let Some(user) = self.user() {
            info!(user_id = %user.id, "Signing out");
        }
        self.clear_storage();
        self.state = AuthState::Anonymous;
    }

    /// Adopt a session obtained elsewhere (e.g. the OAuth callback)
    pub fn adopt(&mut self, session: StoredSession) -> Result<&User, AuthError> {
        self.storage
            .save_session(&session)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        self.state = AuthState::Authenticated(session);
        self.user().ok_or(AuthError::InvalidCredentials)
    }

    fn establish(&mut self, grant: AuthGrant) -> Result<&User, AuthError> {
        let session = grant.into_session();
        if let Err(e) = self.storage.save_session(&session) {
            warn!("Failed to persist session: {}", e);
            self.settle_anonymous();
            return Err(AuthError::Storage(e.to_string()));
        }

        info!(user_id = %session.user.id, role = %session.user.primary_role(), "Signed in");
        self.state = AuthState::Authenticated(session);
        self.user().ok_or(AuthError::InvalidCredentials)
    }

    /// A failed login/register never signs an existing user out, but an
    /// uninitialized context does settle into anonymous.
    fn settle_anonymous(&mut self) {
        if !self.is_authenticated() {
            self.state = AuthState::Anonymous;
        }
    }

    fn clear_storage(&self) {
        if let Err(e) = self.storage.clear_session() {
            warn!("Failed to clear stored session: {}", e);
        }
    }
}
