//! Shared types for Gatehouse

pub mod error;

pub use error::{
    AuthError, CallbackError, ConfigurationWarning, Field, FieldErrors, GatehouseError, Result,
};
