//! OAuth 2.0 authorization-code flow, client side
//!
//! [`AuthorizationRequest`] sends the user to the provider with a fresh
//! `state`; [`CallbackHandler`] handles the redirect back: checks the state,
//! exchanges the code once, reads the user out of the returned token and
//! stores the session.

pub mod authorize;
pub mod callback;

use std::time::Duration;

pub use authorize::AuthorizationRequest;
pub use callback::{CallbackHandler, CallbackOutcome, CallbackParams, TokenResponse};

/// How long the failure screen shows before returning home
pub const DEFAULT_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Provider endpoints and client registration
#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    /// Applies to the token exchange request
    pub timeout: Duration,
    pub redirect_delay: Duration,
    /// Where a successful sign-in lands
    pub success_redirect: String,
}

impl OAuthClientConfig {
    pub fn new(
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: None,
            timeout: Duration::from_secs(10),
            redirect_delay: DEFAULT_REDIRECT_DELAY,
            success_redirect: "/".to_string(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    pub fn with_success_redirect(mut self, route: impl Into<String>) -> Self {
        self.success_redirect = route.into();
        self
    }
}
