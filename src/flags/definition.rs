//! Flag definitions as delivered by the flag source

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

use crate::auth::Role;
use crate::types::ConfigurationWarning;

/// Kind of value a flag produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    Boolean,
    Percentage,
    Multivariate,
    Config,
}

/// Contextual dimension consulted while a flag is in a partial rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlagScope {
    #[default]
    Global,
    Role,
    Audience,
    Space,
    User,
}

/// Lifecycle stage of a flag, independent of its type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RolloutState {
    #[default]
    Off,
    Internal,
    Beta,
    On,
    /// Pending deletion; evaluates like `Off`
    Remove,
}

/// Evaluated value of a flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Variant(String),
    Config(serde_json::Value),
}

impl FlagValue {
    /// Truthiness used when no definition exists to say otherwise
    pub fn is_truthy(&self) -> bool {
        match self {
            FlagValue::Bool(b) => *b,
            FlagValue::Variant(v) => !v.is_empty(),
            FlagValue::Config(v) => !matches!(v, serde_json::Value::Null | serde_json::Value::Bool(false)),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_variant(&self) -> Option<&str> {
        match self {
            FlagValue::Variant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_config(&self) -> Option<&serde_json::Value> {
        match self {
            FlagValue::Config(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for FlagValue {
    fn from(b: bool) -> Self {
        FlagValue::Bool(b)
    }
}

/// A single flag as configured upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagDefinition {
    /// Dot-namespaced key, e.g. `org.links.store`
    pub key: String,

    #[serde(rename = "type")]
    pub flag_type: FlagType,

    #[serde(default)]
    pub scope: FlagScope,

    #[serde(default)]
    pub rollout_state: RolloutState,

    #[serde(default)]
    pub default_value: serde_json::Value,

    /// Share of the audience (0-100) enabled while in beta
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_rollout: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_value: Option<serde_json::Value>,

    /// Only recognised role names; unknown ones never widen the audience
    #[serde(
        default,
        skip_serializing_if = "BTreeSet::is_empty",
        deserialize_with = "known_roles"
    )]
    pub enabled_for_roles: BTreeSet<Role>,

    /// Variant names for multivariate flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FlagDefinition {
    /// Read one definition from its JSON form.
    ///
    /// A definition that can't be read at all is an `Unparseable` warning.
    /// Otherwise the definition comes back with a warning for each unknown
    /// `enabledForRoles` entry it dropped.
    pub fn from_json_value(
        value: serde_json::Value,
    ) -> Result<(Self, Vec<ConfigurationWarning>), ConfigurationWarning> {
        let unknown_roles: Vec<String> = value
            .get("enabledForRoles")
            .and_then(serde_json::Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .filter(|raw| raw.parse::<Role>().is_err())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let key = value
            .get("key")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        let def: FlagDefinition =
            serde_json::from_value(value).map_err(|e| ConfigurationWarning::Unparseable {
                key,
                reason: e.to_string(),
            })?;

        let warnings = unknown_roles
            .into_iter()
            .map(|raw| ConfigurationWarning::InvalidField {
                key: def.key.clone(),
                field: "enabledForRoles",
                reason: format!("unknown role '{}'", raw),
            })
            .collect();

        Ok((def, warnings))
    }

    /// Minimal definition with everything optional left empty
    pub fn new(key: impl Into<String>, flag_type: FlagType, rollout_state: RolloutState) -> Self {
        Self {
            key: key.into(),
            flag_type,
            scope: FlagScope::Global,
            rollout_state,
            default_value: serde_json::Value::Null,
            percentage_rollout: None,
            config_value: None,
            enabled_for_roles: BTreeSet::new(),
            variants: Vec::new(),
            description: None,
        }
    }

    pub fn with_scope(mut self, scope: FlagScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default_value = value;
        self
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.percentage_rollout = Some(percentage);
        self
    }

    pub fn with_config(mut self, value: serde_json::Value) -> Self {
        self.config_value = Some(value);
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.enabled_for_roles = roles.into_iter().collect();
        self
    }

    pub fn with_variants(mut self, variants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }

    /// The definition's default, read according to the flag type
    pub fn typed_default(&self) -> FlagValue {
        match self.flag_type {
            FlagType::Boolean | FlagType::Percentage => {
                FlagValue::Bool(self.default_value.as_bool().unwrap_or(false))
            }
            FlagType::Multivariate => FlagValue::Variant(
                self.default_value.as_str().unwrap_or_default().to_string(),
            ),
            FlagType::Config => FlagValue::Config(self.default_value.clone()),
        }
    }

    /// Percentage rollout, checked to be present and within 0-100
    pub fn checked_percentage(&self) -> Result<f64, ConfigurationWarning> {
        let percentage = self
            .percentage_rollout
            .ok_or_else(|| ConfigurationWarning::MissingField {
                key: self.key.clone(),
                field: "percentageRollout",
            })?;

        if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
            return Err(ConfigurationWarning::InvalidField {
                key: self.key.clone(),
                field: "percentageRollout",
                reason: format!("{} is outside 0-100", percentage),
            });
        }

        Ok(percentage)
    }

    pub fn checked_config(&self) -> Result<&serde_json::Value, ConfigurationWarning> {
        self.config_value
            .as_ref()
            .ok_or_else(|| ConfigurationWarning::MissingField {
                key: self.key.clone(),
                field: "configValue",
            })
    }

    pub fn checked_variants(&self) -> Result<&[String], ConfigurationWarning> {
        if self.variants.is_empty() {
            return Err(ConfigurationWarning::MissingField {
                key: self.key.clone(),
                field: "variants",
            });
        }
        Ok(&self.variants)
    }

    pub fn checked_roles(&self) -> Result<&BTreeSet<Role>, ConfigurationWarning> {
        if self.enabled_for_roles.is_empty() {
            return Err(ConfigurationWarning::MissingField {
                key: self.key.clone(),
                field: "enabledForRoles",
            });
        }
        Ok(&self.enabled_for_roles)
    }
}

fn known_roles<'de, D>(deserializer: D) -> Result<BTreeSet<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().filter_map(|role| role.parse().ok()).collect())
}

/// Whether a flag key is dot-namespaced with non-empty, plain segments
pub fn is_valid_key(key: &str) -> bool {
    key.contains('.')
        && key.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}
