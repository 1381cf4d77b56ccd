//! OAuth redirect callback
//!
//! One pass, no retries:
//! 1. parse `code` / `state` / `error` from the callback query
//! 2. compare `state` with the one stored by [`AuthorizationRequest`](super::AuthorizationRequest)
//! 3. POST the code to the token endpoint (form-encoded, with a timeout)
//! 4. decode the returned token's payload into a [`User`]
//! 5. hand the session to the auth context, which persists it
//!
//! Every failure ends in [`CallbackOutcome::Failed`], which tells the caller
//! how long to show the error before returning home.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::OAuthClientConfig;
use crate::auth::{
    decode_payload, keys, AuthBackend, AuthContext, KeyValueStore, StoredSession, TokenClaims,
    User,
};
use crate::types::{AuthError, CallbackError, GatehouseError, Result};

/// Query parameters the provider redirects back with
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a raw query string, with or without the leading `?`
    pub fn from_query(query: &str) -> std::result::Result<Self, CallbackError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        serde_urlencoded::from_str(query).map_err(|e| CallbackError::InvalidQuery(e.to_string()))
    }

    /// The authorization code, once provider errors and the state check pass.
    /// `expected_state` is the state stored when the flow started, if any.
    pub fn authorization_code(
        &self,
        expected_state: Option<&str>,
    ) -> std::result::Result<&str, CallbackError> {
        if let Some(error) = &self.error {
            return Err(CallbackError::Provider {
                error: error.clone(),
                description: self.error_description.clone(),
            });
        }

        let code = match self.code.as_deref() {
            Some(code) if !code.is_empty() => code,
            _ => return Err(CallbackError::MissingParameter("code")),
        };

        match expected_state {
            Some(expected) if self.state.as_deref() != Some(expected) => {
                Err(CallbackError::StateMismatch)
            }
            Some(_) => Ok(code),
            None => {
                warn!("No pending authorization state stored, skipping state check");
                Ok(code)
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

/// Token endpoint response (RFC 6749 section 5.1)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl TokenResponse {
    /// Build the session this response grants. Identity comes from the ID
    /// token when present, else from the access token.
    pub fn into_session(self) -> std::result::Result<StoredSession, CallbackError> {
        let identity_token = self.id_token.as_deref().unwrap_or(&self.access_token);
        let claims: TokenClaims = decode_payload(identity_token)?;
        if claims.sub.is_empty() {
            return Err(CallbackError::MalformedToken("token has no subject".into()));
        }

        let user = claims.to_user();
        let session = StoredSession::new(user, self.access_token)
            .with_refresh_token(self.refresh_token);

        Ok(match (self.expires_in, claims.exp) {
            (Some(secs), _) => session.expiring_in(secs),
            (None, exp) if exp > 0 => {
                let at = i64::try_from(exp)
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                session.with_expires_at(at)
            }
            _ => session,
        })
    }
}

/// Terminal state of the callback screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Authenticated { user: User, redirect_to: String },
    Failed {
        error: CallbackError,
        redirect_home_after: Duration,
    },
}

impl CallbackOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, CallbackOutcome::Authenticated { .. })
    }
}

/// Completes the authorization-code flow
pub struct CallbackHandler {
    config: OAuthClientConfig,
    http: reqwest::Client,
}

impl CallbackHandler {
    pub fn new(config: OAuthClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatehouseError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    /// Run the callback for `query` and sign the context in on success
    pub async fn handle<S, B>(&self, query: &str, ctx: &mut AuthContext<S, B>) -> CallbackOutcome
    where
        S: KeyValueStore,
        B: AuthBackend,
    {
        match self.complete(query, ctx).await {
            Ok(user) => {
                info!(user_id = %user.id, "OAuth sign-in complete");
                CallbackOutcome::Authenticated {
                    user,
                    redirect_to: self.config.success_redirect.clone(),
                }
            }
            Err(error) => {
                warn!("OAuth callback failed: {}", error);
                CallbackOutcome::Failed {
                    error,
                    redirect_home_after: self.config.redirect_delay,
                }
            }
        }
    }

    async fn complete<S, B>(
        &self,
        query: &str,
        ctx: &mut AuthContext<S, B>,
    ) -> std::result::Result<User, CallbackError>
    where
        S: KeyValueStore,
        B: AuthBackend,
    {
        let params = CallbackParams::from_query(query)?;

        // The stored state is single use whatever the outcome
        let expected_state = ctx.storage().get(keys::OAUTH_STATE)?;
        if expected_state.is_some() {
            if let Err(e) = ctx.storage().remove(keys::OAUTH_STATE) {
                warn!("Failed to clear pending authorization state: {}", e);
            }
        }

        let code = params.authorization_code(expected_state.as_deref())?;
        let tokens = self.exchange_code(code).await?;
        let session = tokens.into_session()?;

        ctx.adopt(session).map(User::clone).map_err(|e| match e {
            AuthError::Storage(msg) => CallbackError::Storage(msg),
            other => CallbackError::Storage(other.to_string()),
        })
    }

    /// Exchange an authorization code at the token endpoint. Exactly one request.
    pub async fn exchange_code(&self, code: &str) -> std::result::Result<TokenResponse, CallbackError> {
        let form = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.config.client_id,
            code,
            redirect_uri: &self.config.redirect_uri,
        };

        debug!(token_url = %self.config.token_url, "Exchanging authorization code");

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallbackError::TokenExchange("token endpoint timed out".into())
                } else {
                    CallbackError::TokenExchange(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallbackError::TokenExchange(describe_failure(status, &body)));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| CallbackError::TokenExchange(format!("unreadable token response: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

fn describe_failure(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<TokenErrorBody>(body) {
        Ok(TokenErrorBody {
            error,
            error_description: Some(description),
        }) => format!("{} ({}): {}", error, status, description),
        Ok(TokenErrorBody { error, .. }) => format!("{} ({})", error, status),
        Err(_) => format!("token endpoint returned {}", status),
    }
}
