//! Feature flags
//!
//! - [`FlagDefinition`]: a flag as configured upstream (type, scope, rollout state)
//! - [`FlagStore`] / [`FlagSnapshot`]: immutable per-session snapshot and its sources
//! - [`FlagEvaluator`]: resolves a flag for an [`EvaluationContext`]

pub mod bucket;
pub mod definition;
pub mod evaluator;
pub mod store;

pub use definition::{is_valid_key, FlagDefinition, FlagScope, FlagType, FlagValue, RolloutState};
pub use evaluator::{EnabledFlags, Evaluation, EvaluationContext, EvaluationReason, FlagEvaluator};
pub use store::{FileFlagSource, FlagSnapshot, FlagSource, FlagStore, HttpFlagSource};
