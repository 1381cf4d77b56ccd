//! Authentication
//!
//! - [`AuthContext`]: session state machine, the single writer of session state
//! - [`AuthBackend`]: who checks credentials ([`LocalAccountBackend`], [`HttpAuthBackend`])
//! - [`SessionStorage`]: where the session is persisted ([`MemoryStore`], [`FileStore`])

pub mod backend;
pub mod context;
pub mod jwt;
pub mod password;
pub mod roles;
pub mod session;
pub mod storage;
pub mod validation;

pub use backend::{AuthBackend, AuthGrant, HttpAuthBackend, LocalAccountBackend};
pub use context::{AuthContext, AuthState, ExpiryPolicy};
pub use jwt::{decode_payload, TokenClaims, TokenIssuer};
pub use password::{hash_password, password_matches};
pub use roles::{primary_role, Role, UnknownRole};
pub use session::{StoredSession, User};
pub use storage::{keys, FileStore, KeyValueStore, MemoryStore, SessionStorage};
pub use validation::{is_valid_email, RegistrationData, ValidRegistration, MIN_PASSWORD_LEN};
