//! JWT session tokens
//!
//! Two jobs:
//! - [`TokenIssuer`] signs HS256 tokens for locally held accounts
//! - [`decode_payload`] reads the claims out of a provider token without
//!   verifying its signature. The client trusts the token because it just
//!   received it from the token endpoint over TLS; anything that needs a
//!   trust decision verifies server-side.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use super::roles::Role;
use super::session::User;
use crate::types::{CallbackError, GatehouseError};

/// Claims carried by session and ID tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the user id
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    /// Single-role providers send `role` instead of `roles`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub iat: u64,
    #[serde(default)]
    pub exp: u64,
}

impl TokenClaims {
    pub fn for_user(user: &User, iat: u64, exp: u64) -> Self {
        Self {
            sub: user.id.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            role: None,
            given_name: user.first_name.clone(),
            family_name: user.last_name.clone(),
            name: user.display_name.clone(),
            iat,
            exp,
        }
    }

    /// Build the user these claims describe
    pub fn to_user(&self) -> User {
        let mut roles = self.roles.clone();
        if let Some(role) = self.role {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }

        let mut user = User::new(self.sub.clone(), self.email.clone(), roles);
        user.first_name = self.given_name.clone();
        user.last_name = self.family_name.clone();
        user.display_name = self.name.clone();
        user
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64,
}

/// Signs HS256 session tokens for local accounts
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    expiry_seconds: u64,
}

impl TokenIssuer {
    /// Returns an error if the secret is empty or shorter than 32 characters
    pub fn new(secret: String, expiry_seconds: u64) -> Result<Self, GatehouseError> {
        if secret.is_empty() {
            return Err(GatehouseError::Config("Token secret is required".into()));
        }

        if secret.len() < 32 {
            return Err(GatehouseError::Config(
                "Token secret must be at least 32 characters".into(),
            ));
        }

        Ok(Self {
            secret,
            expiry_seconds,
        })
    }

    /// Issuer with a fixed secret, for development and tests
    pub fn new_dev() -> Self {
        Self {
            secret: "dev-mode-secret-not-for-production-use-123456".into(),
            expiry_seconds: 3600,
        }
    }

    pub fn issue(&self, user: &User) -> Result<IssuedToken, GatehouseError> {
        let now = unix_now()?;
        let exp = now.checked_add(self.expiry_seconds).ok_or_else(|| {
            GatehouseError::Config(format!(
                "Token lifetime of {}s is out of range",
                self.expiry_seconds
            ))
        })?;
        let claims = TokenClaims::for_user(user, now, exp);

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| GatehouseError::Internal(format!("Failed to generate token: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_in: self.expiry_seconds,
        })
    }
}

fn unix_now() -> Result<u64, GatehouseError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| GatehouseError::Internal(format!("System time error: {}", e)))
}

/// Decode the payload segment of a JWT without checking the signature
pub fn decode_payload<T: DeserializeOwned>(token: &str) -> Result<T, CallbackError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(CallbackError::MalformedToken(
                "expected three dot-separated segments".into(),
            ))
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| CallbackError::MalformedToken(format!("payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| CallbackError::MalformedToken(format!("payload is not valid claims: {}", e)))
}
