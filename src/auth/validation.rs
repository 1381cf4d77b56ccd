//! Client-side registration validation
//!
//! All fields are checked in one pass so the form can show every problem at
//! once instead of one error per submit.

use serde::Deserialize;

use super::roles::Role;
use crate::types::{Field, FieldErrors};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Registration form as submitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationData {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub company: Option<String>,
}

/// Registration data that passed validation, with names and email trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub company: Option<String>,
}

impl RegistrationData {
    pub fn validate(&self) -> Result<ValidRegistration, FieldErrors> {
        let mut errors = FieldErrors::new();

        let first_name = self.first_name.trim();
        if first_name.is_empty() {
            errors.add(Field::FirstName, "First name is required");
        }

        let last_name = self.last_name.trim();
        if last_name.is_empty() {
            errors.add(Field::LastName, "Last name is required");
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.add(Field::Email, "Email is required");
        } else if !is_valid_email(email) {
            errors.add(Field::Email, "Please enter a valid email address");
        }

        if self.password.is_empty() {
            errors.add(Field::Password, "Password is required");
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                Field::Password,
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            );
        }

        if self.confirm_password != self.password {
            errors.add(Field::ConfirmPassword, "Passwords do not match");
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(ValidRegistration {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_ascii_lowercase(),
            password: self.password.clone(),
            role: self.role.unwrap_or_default(),
            company: self
                .company
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        })
    }
}

/// Loose structural email check: `local@domain.tld`, no whitespace
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    match domain.rsplit_once('.') {
        Some((host, tld)) => {
            !host.is_empty() && !tld.is_empty() && !host.starts_with('.') && !host.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegistrationData {
        RegistrationData {
            first_name: " Ana ".into(),
            last_name: "Lima".into(),
            email: "Ana@Example.com".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
            role: Some(Role::ServiceProvider),
            company: Some("  ".into()),
        }
    }

    #[test]
    fn test_valid_registration() {
        let ok = valid().validate().unwrap();
        assert_eq!(ok.first_name, "Ana");
        assert_eq!(ok.email, "ana@example.com");
        assert_eq!(ok.role, Role::ServiceProvider);
        assert_eq!(ok.company, None);
    }

    #[test]
    fn test_mismatched_confirmation() {
        let data = RegistrationData {
            confirm_password: "secret2".into(),
            ..valid()
        };
        let errors = data.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get(Field::ConfirmPassword),
            Some("Passwords do not match")
        );
    }

    #[test]
    fn test_reports_every_field() {
        let errors = RegistrationData::default().validate().unwrap_err();
        assert!(errors.contains(Field::FirstName));
        assert!(errors.contains(Field::LastName));
        assert!(errors.contains(Field::Email));
        assert!(errors.contains(Field::Password));
        // Empty password and empty confirmation match
        assert!(!errors.contains(Field::ConfirmPassword));
    }

    #[test]
    fn test_short_password() {
        let data = RegistrationData {
            password: "abc".into(),
            confirm_password: "abc".into(),
            ..valid()
        };
        let errors = data.validate().unwrap_err();
        assert_eq!(
            errors.get(Field::Password),
            Some("Password must be at least 6 characters")
        );
    }

    #[test]
    fn test_default_role_is_maker() {
        let data = RegistrationData {
            role: None,
            ..valid()
        };
        assert_eq!(data.validate().unwrap().role, Role::Maker);
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("plain"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@example"));
        assert!(!is_valid_email("a@.com"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email("a b@example.com"));
        assert!(!is_valid_email("a@example."));
    }
}
