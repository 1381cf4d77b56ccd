//! Gatehouse - the client core behind the storefront
//!
//! Decides what a visitor sees and who they are:
//!
//! - **Flags**: immutable per-session snapshot of flag definitions and a pure
//!   evaluator (rollout state, scope, stable percentage bucketing)
//! - **Guards**: `FlagGuard`, `NavLinkGuard` and `ModuleGuard` choose between
//!   content, a "coming soon" fallback, or nothing
//! - **Auth**: session state machine over a key-value storage port, login,
//!   registration with per-field validation, logout
//! - **OAuth**: authorization-code callback (state check, one token exchange,
//!   JWT payload decode)
//! - **Navigation**: role-based quick actions filtered by enabled flags

pub mod auth;
pub mod config;
pub mod flags;
pub mod guards;
pub mod logging;
pub mod nav;
pub mod oauth;
pub mod types;

pub use auth::{AuthContext, AuthState, Role, User};
pub use config::Args;
pub use flags::{EvaluationContext, FlagEvaluator, FlagStore, FlagValue};
pub use types::{GatehouseError, Result};
