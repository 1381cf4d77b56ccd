//! Error types for Gatehouse
//!
//! Infrastructure faults (config, IO, HTTP, storage) live in [`GatehouseError`].
//! The user-facing taxonomies have their own enums so callers can turn them
//! into UI state without string matching:
//!
//! - [`ConfigurationWarning`]: malformed or missing flag definitions (logged, never raised)
//! - [`AuthError`]: login and registration failures
//! - [`CallbackError`]: OAuth callback failures

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Main error type for Gatehouse infrastructure operations
#[derive(Debug, thiserror::Error)]
pub enum GatehouseError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Flag source error: {0}")]
    FlagSource(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for GatehouseError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GatehouseError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for GatehouseError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Result type alias for Gatehouse operations
pub type Result<T> = std::result::Result<T, GatehouseError>;

// =============================================================================
// Flag configuration warnings
// =============================================================================

/// A malformed or unusable flag definition.
///
/// Evaluation recovers locally (the default value is used) and reports this
/// to a [`crate::logging::WarningSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigurationWarning {
    #[error("flag '{key}' has an invalid key")]
    InvalidKey { key: String },

    #[error("flag '{key}' is missing required field '{field}'")]
    MissingField { key: String, field: &'static str },

    #[error("flag '{key}' has invalid field '{field}': {reason}")]
    InvalidField {
        key: String,
        field: &'static str,
        reason: String,
    },

    #[error("flag '{key}' is defined more than once")]
    DuplicateKey { key: String },

    /// The definition could not be read at all and was skipped
    #[error("flag '{key}' could not be parsed: {reason}")]
    Unparseable { key: String, reason: String },
}

impl ConfigurationWarning {
    /// Flag key the warning is about
    pub fn key(&self) -> &str {
        match self {
            Self::InvalidKey { key }
            | Self::MissingField { key, .. }
            | Self::InvalidField { key, .. }
            | Self::DuplicateKey { key }
            | Self::Unparseable { key, .. } => key,
        }
    }
}

// =============================================================================
// Auth errors
// =============================================================================

/// Registration form fields that can carry a validation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    FirstName,
    LastName,
    Email,
    Password,
    ConfirmPassword,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::FirstName => "firstName",
            Field::LastName => "lastName",
            Field::Email => "email",
            Field::Password => "password",
            Field::ConfirmPassword => "confirmPassword",
        };
        f.write_str(name)
    }
}

/// Per-field validation messages, ordered by field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<Field, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for a field. The first message for a field wins.
    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.0.entry(field).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Login or registration failure, surfaced to the user as form state
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Please correct the highlighted fields: {0}")]
    Validation(FieldErrors),

    #[error("An account with this email already exists")]
    AccountExists,

    #[error("Sign-in service unavailable: {0}")]
    Backend(String),

    #[error("Could not save your session: {0}")]
    Storage(String),
}

impl AuthError {
    /// Field errors, when this is a validation failure
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<GatehouseError> for AuthError {
    fn from(err: GatehouseError) -> Self {
        match err {
            GatehouseError::Storage(msg) => Self::Storage(msg),
            other => Self::Backend(other.to_string()),
        }
    }
}

// =============================================================================
// OAuth callback errors
// =============================================================================

/// Terminal failure of the OAuth redirect callback
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackError {
    #[error("Missing '{0}' parameter in callback")]
    MissingParameter(&'static str),

    #[error("Unreadable callback query: {0}")]
    InvalidQuery(String),

    #[error("Provider returned error '{error}'{}", describe(.description))]
    Provider {
        error: String,
        description: Option<String>,
    },

    #[error("State parameter does not match the pending authorization")]
    StateMismatch,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Could not save your session: {0}")]
    Storage(String),
}

fn describe(description: &Option<String>) -> String {
    description
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

impl From<GatehouseError> for CallbackError {
    fn from(err: GatehouseError) -> Self {
        match err {
            GatehouseError::Storage(msg) => Self::Storage(msg),
            other => Self::TokenExchange(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_first_message_wins() {
        let mut errors = FieldErrors::new();
        errors.add(Field::Email, "Email is required");
        errors.add(Field::Email, "Email is invalid");
        errors.add(Field::FirstName, "First name is required");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get(Field::Email), Some("Email is required"));
        assert_eq!(
            errors.to_string(),
            "firstName: First name is required; email: Email is required"
        );
    }

    #[test]
    fn test_provider_error_display() {
        let err = CallbackError::Provider {
            error: "access_denied".into(),
            description: Some("User cancelled".into()),
        };
        assert_eq!(
            err.to_string(),
            "Provider returned error 'access_denied': User cancelled"
        );

        let bare = CallbackError::Provider {
            error: "server_error".into(),
            description: None,
        };
        assert_eq!(bare.to_string(), "Provider returned error 'server_error'");
    }

    #[test]
    fn test_storage_errors_map_through() {
        let auth: AuthError = GatehouseError::Storage("disk full".into()).into();
        assert_eq!(auth, AuthError::Storage("disk full".into()));

        let cb: CallbackError = GatehouseError::Http("timeout".into()).into();
        assert!(matches!(cb, CallbackError::TokenExchange(_)));
    }
}
