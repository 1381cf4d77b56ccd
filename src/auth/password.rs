//! Password hashes for accounts held by [`LocalAccountBackend`](super::LocalAccountBackend)
//!
//! Each account record keeps an Argon2id PHC string, so the salt and cost
//! parameters travel with the hash.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::warn;

use crate::types::GatehouseError;

/// PHC string for a new account's password
pub fn hash_password(password: &str) -> Result<String, GatehouseError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| GatehouseError::Internal(format!("Failed to hash password: {e}")))
}

/// Whether `password` matches an account's stored hash. A stored value that
/// isn't a PHC string never matches.
pub fn password_matches(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Unreadable stored password hash: {e}");
            false
        }
    }
}
