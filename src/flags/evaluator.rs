//! Flag evaluation
//!
//! Evaluation is a pure function of the snapshot, the caller's default and the
//! [`EvaluationContext`]. It never fails: missing flags return the caller's
//! default, malformed ones return the definition's default and report a
//! [`ConfigurationWarning`] to the sink.
//!
//! | rollout state   | result                                                   |
//! |-----------------|----------------------------------------------------------|
//! | `off`, `remove` | disabled value                                           |
//! | `on`            | fully enabled value                                      |
//! | `internal`      | enabled iff the context is an internal user              |
//! | `beta`          | role scope: role in `enabledForRoles`; otherwise stable  |
//! |                 | bucket of (key, bucketing id) below `percentageRollout`  |

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::bucket::{in_rollout, pick_variant};
use super::definition::{FlagDefinition, FlagScope, FlagType, FlagValue, RolloutState};
use super::store::FlagSnapshot;
use crate::auth::{Role, User};
use crate::logging::{TracingWarningSink, WarningSink};
use crate::types::ConfigurationWarning;

/// Who is asking: the attributes scopes consult
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationContext {
    pub user_id: Option<String>,
    pub roles: Vec<Role>,
    pub is_internal_user: bool,
    pub audience_id: Option<String>,
    pub space_id: Option<String>,
}

impl EvaluationContext {
    /// Signed-out visitor
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for a signed-in user. Internal status comes from the user's
    /// roles or from an email domain in `internal_domains`.
    pub fn for_user(user: &User, internal_domains: &[String]) -> Self {
        let domain_internal = user
            .email
            .rsplit_once('@')
            .map(|(_, domain)| {
                internal_domains
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(domain))
            })
            .unwrap_or(false);

        Self {
            user_id: Some(user.id.clone()),
            roles: user.roles.clone(),
            is_internal_user: domain_internal || user.roles.iter().any(Role::is_internal),
            audience_id: None,
            space_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.is_internal_user = internal;
        self
    }

    pub fn with_audience(mut self, audience_id: impl Into<String>) -> Self {
        self.audience_id = Some(audience_id.into());
        self
    }

    pub fn with_space(mut self, space_id: impl Into<String>) -> Self {
        self.space_id = Some(space_id.into());
        self
    }

    /// Id used for percentage bucketing under `scope`
    fn bucketing_id(&self, scope: FlagScope) -> Option<&str> {
        match scope {
            FlagScope::Space => self.space_id.as_deref(),
            FlagScope::Audience => self.audience_id.as_deref().or(self.user_id.as_deref()),
            FlagScope::Global | FlagScope::User | FlagScope::Role => self.user_id.as_deref(),
        }
    }
}

/// Why an evaluation came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
    /// No definition for the key
    Missing,
    /// `off` or `remove`
    Off,
    On,
    Internal,
    Beta,
    /// Definition unusable; default applied
    Malformed,
}

/// Full result of evaluating one flag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub value: FlagValue,
    /// Whether the feature behind the flag should be shown
    pub enabled: bool,
    pub reason: EvaluationReason,
}

impl Evaluation {
    fn disabled(value: FlagValue, reason: EvaluationReason) -> Self {
        Self {
            value,
            enabled: false,
            reason,
        }
    }

    fn enabled(value: FlagValue, reason: EvaluationReason) -> Self {
        Self {
            value,
            enabled: true,
            reason,
        }
    }
}

/// Evaluates flags from one snapshot
#[derive(Clone)]
pub struct FlagEvaluator {
    snapshot: Arc<FlagSnapshot>,
    sink: Arc<dyn WarningSink>,
}

impl FlagEvaluator {
    /// Evaluator that logs warnings through `tracing`
    pub fn new(snapshot: Arc<FlagSnapshot>) -> Self {
        Self::with_sink(snapshot, Arc::new(TracingWarningSink::new()))
    }

    pub fn with_sink(snapshot: Arc<FlagSnapshot>, sink: Arc<dyn WarningSink>) -> Self {
        Self { snapshot, sink }
    }

    pub fn snapshot(&self) -> &FlagSnapshot {
        &self.snapshot
    }

    /// Evaluate `key`, returning only the value
    pub fn evaluate(&self, key: &str, default: FlagValue, ctx: &EvaluationContext) -> FlagValue {
        self.resolve(key, default, ctx).value
    }

    /// Whether the feature behind `key` is on for `ctx`. Missing flags are off.
    pub fn is_enabled(&self, key: &str, ctx: &EvaluationContext) -> bool {
        self.resolve(key, FlagValue::Bool(false), ctx).enabled
    }

    /// Every flag in the snapshot that is enabled for `ctx`
    pub fn enabled_flags(&self, ctx: &EvaluationContext) -> EnabledFlags {
        self.snapshot
            .keys()
            .into_iter()
            .filter(|key| self.is_enabled(key, ctx))
            .map(str::to_string)
            .collect()
    }

    /// Evaluate `key` with the reason attached
    pub fn resolve(&self, key: &str, default: FlagValue, ctx: &EvaluationContext) -> Evaluation {
        let Some(def) = self.snapshot.get(key) else {
            let enabled = default.is_truthy();
            return Evaluation {
                value: default,
                enabled,
                reason: EvaluationReason::Missing,
            };
        };

        match evaluate_definition(def, ctx) {
            Ok(evaluation) => evaluation,
            Err(warning) => {
                self.sink.report(&warning);
                Evaluation::disabled(def.typed_default(), EvaluationReason::Malformed)
            }
        }
    }
}

/// Enabled flag keys for one context, used by the navigation composer
pub type EnabledFlags = BTreeSet<String>;

fn evaluate_definition(
    def: &FlagDefinition,
    ctx: &EvaluationContext,
) -> Result<Evaluation, ConfigurationWarning> {
    match def.rollout_state {
        RolloutState::Off | RolloutState::Remove => Ok(Evaluation::disabled(
            disabled_value(def),
            EvaluationReason::Off,
        )),
        RolloutState::On => Ok(Evaluation::enabled(
            enabled_value(def, ctx)?,
            EvaluationReason::On,
        )),
        RolloutState::Internal => {
            if ctx.is_internal_user {
                Ok(Evaluation::enabled(
                    enabled_value(def, ctx)?,
                    EvaluationReason::Internal,
                ))
            } else {
                Ok(Evaluation::disabled(
                    disabled_value(def),
                    EvaluationReason::Internal,
                ))
            }
        }
        RolloutState::Beta => {
            if in_beta(def, ctx)? {
                Ok(Evaluation::enabled(
                    enabled_value(def, ctx)?,
                    EvaluationReason::Beta,
                ))
            } else {
                Ok(Evaluation::disabled(
                    disabled_value(def),
                    EvaluationReason::Beta,
                ))
            }
        }
    }
}

fn disabled_value(def: &FlagDefinition) -> FlagValue {
    match def.flag_type {
        FlagType::Boolean | FlagType::Percentage => FlagValue::Bool(false),
        FlagType::Multivariate | FlagType::Config => def.typed_default(),
    }
}

fn enabled_value(
    def: &FlagDefinition,
    ctx: &EvaluationContext,
) -> Result<FlagValue, ConfigurationWarning> {
    match def.flag_type {
        FlagType::Boolean | FlagType::Percentage => Ok(FlagValue::Bool(true)),
        FlagType::Config => Ok(FlagValue::Config(def.checked_config()?.clone())),
        FlagType::Multivariate => {
            let variants = def.checked_variants()?;
            let variant = match ctx.bucketing_id(def.scope) {
                Some(id) => pick_variant(&def.key, id, variants),
                // No id to bucket on: everyone without one sees the first variant
                None => variants.first().map(String::as_str),
            };
            Ok(FlagValue::Variant(variant.unwrap_or_default().to_string()))
        }
    }
}

fn in_beta(def: &FlagDefinition, ctx: &EvaluationContext) -> Result<bool, ConfigurationWarning> {
    if def.scope == FlagScope::Role {
        let roles = def.checked_roles()?;
        return Ok(ctx.roles.iter().any(|r| roles.contains(r)));
    }

    let percentage = def.checked_percentage()?;
    // Full and empty rollouts need no bucket, so they hold without an id too
    if percentage >= 100.0 {
        return Ok(true);
    }
    if percentage <= 0.0 {
        return Ok(false);
    }
    Ok(match ctx.bucketing_id(def.scope) {
        Some(id) => in_rollout(&def.key, id, percentage),
        None => false,
    })
}
