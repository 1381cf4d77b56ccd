//! Flag store: immutable snapshots of flag definitions and where they come from
//!
//! A snapshot is fetched once per session and shared read-only. Replacing it
//! goes through [`FlagStore::replace`]; nothing mutates a snapshot in place.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::definition::{is_valid_key, FlagDefinition};
use crate::logging::WarningSink;
use crate::types::{ConfigurationWarning, GatehouseError, Result};

/// Wire shape of a snapshot document. Definitions stay raw JSON here so one
/// unreadable entry costs only that flag.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SnapshotDocument {
    Envelope {
        #[serde(default)]
        version: Option<String>,
        flags: Vec<serde_json::Value>,
    },
    Bare(Vec<serde_json::Value>),
}

/// Resolved set of flag definitions, keyed by flag key
#[derive(Debug, Clone, Default)]
pub struct FlagSnapshot {
    flags: HashMap<String, FlagDefinition>,
    version: Option<String>,
}

impl FlagSnapshot {
    /// Empty snapshot: every lookup falls back to the caller's default
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot, dropping definitions with invalid or duplicate keys.
    ///
    /// The first definition for a key wins; rejects are reported to `sink`.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = FlagDefinition>,
        sink: &dyn WarningSink,
    ) -> Self {
        let mut flags = HashMap::new();

        for def in definitions {
            if !is_valid_key(&def.key) {
                sink.report(&ConfigurationWarning::InvalidKey { key: def.key });
                continue;
            }
            if flags.contains_key(&def.key) {
                sink.report(&ConfigurationWarning::DuplicateKey { key: def.key });
                continue;
            }
            flags.insert(def.key.clone(), def);
        }

        Self {
            flags,
            version: None,
        }
    }

    /// Parse a JSON snapshot: either a bare array of definitions or
    /// `{"version": "...", "flags": [...]}`
    pub fn from_json(json: &str, sink: &dyn WarningSink) -> Result<Self> {
        let document: SnapshotDocument = serde_json::from_str(json)
            .map_err(|e| GatehouseError::FlagSource(format!("Invalid flag snapshot: {}", e)))?;

        let (version, entries) = match document {
            SnapshotDocument::Envelope { version, flags } => (version, flags),
            SnapshotDocument::Bare(flags) => (None, flags),
        };

        let definitions: Vec<FlagDefinition> = entries
            .into_iter()
            .filter_map(|entry| match FlagDefinition::from_json_value(entry) {
                Ok((def, warnings)) => {
                    for warning in &warnings {
                        sink.report(warning);
                    }
                    Some(def)
                }
                Err(warning) => {
                    sink.report(&warning);
                    None
                }
            })
            .collect();

        let mut snapshot = Self::from_definitions(definitions, sink);
        snapshot.version = version;
        Ok(snapshot)
    }

    pub fn get(&self, key: &str) -> Option<&FlagDefinition> {
        self.flags.get(key)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Flag keys in sorted order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.flags.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }
}

/// Where flag snapshots come from
#[async_trait]
pub trait FlagSource: Send + Sync {
    async fn fetch(&self, sink: &dyn WarningSink) -> Result<FlagSnapshot>;
}

/// Reads a snapshot from a JSON file on disk
#[derive(Debug, Clone)]
pub struct FileFlagSource {
    path: PathBuf,
}

impl FileFlagSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FlagSource for FileFlagSource {
    async fn fetch(&self, sink: &dyn WarningSink) -> Result<FlagSnapshot> {
        let json = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            GatehouseError::FlagSource(format!(
                "Failed to read flags from {}: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!("Loaded flag snapshot from {}", self.path.display());
        FlagSnapshot::from_json(&json, sink)
    }
}

/// Fetches a snapshot with a single GET
#[derive(Debug, Clone)]
pub struct HttpFlagSource {
    url: String,
    http: reqwest::Client,
}

impl HttpFlagSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatehouseError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl FlagSource for HttpFlagSource {
    async fn fetch(&self, sink: &dyn WarningSink) -> Result<FlagSnapshot> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| GatehouseError::FlagSource(format!("Flag request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(GatehouseError::FlagSource(format!(
                "Flag request failed ({})",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatehouseError::FlagSource(format!("Failed to read flags: {}", e)))?;

        FlagSnapshot::from_json(&body, sink)
    }
}

/// Holds the current snapshot for a session
#[derive(Debug, Clone, Default)]
pub struct FlagStore {
    snapshot: Arc<FlagSnapshot>,
}

impl FlagStore {
    pub fn new(snapshot: FlagSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
        }
    }

    /// Fetch once from `source` and wrap the result
    pub async fn load(source: &dyn FlagSource, sink: &dyn WarningSink) -> Result<Self> {
        let snapshot = source.fetch(sink).await?;
        info!(
            flags = snapshot.len(),
            version = snapshot.version().unwrap_or("unversioned"),
            "Flag snapshot loaded"
        );
        Ok(Self::new(snapshot))
    }

    /// Current snapshot; cheap to clone and safe to hold across renders
    pub fn snapshot(&self) -> Arc<FlagSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Swap in a new snapshot. Holders of the old one keep seeing it.
    pub fn replace(&mut self, snapshot: FlagSnapshot) {
        self.snapshot = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::definition::{FlagType, RolloutState};
    use crate::logging::MemoryWarningSink;

    #[test]
    fn test_parse_bare_array() {
        let sink = MemoryWarningSink::new();
        let snapshot = FlagSnapshot::from_json(
            r#"[
                {"key": "org.links.store", "type": "boolean", "rolloutState": "on"},
                {"key": "org.forum.enabled", "type": "boolean", "rolloutState": "off"}
            ]"#,
            &sink,
        )
        .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.keys(), vec!["org.forum.enabled", "org.links.store"]);
        assert_eq!(snapshot.version(), None);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_parse_envelope() {
        let sink = MemoryWarningSink::new();
        let snapshot = FlagSnapshot::from_json(
            r#"{"version": "2024-06-01", "flags": [
                {"key": "org.links.learn", "type": "boolean", "rolloutState": "beta",
                 "percentageRollout": 50}
            ]}"#,
            &sink,
        )
        .unwrap();

        assert_eq!(snapshot.version(), Some("2024-06-01"));
        assert_eq!(
            snapshot.get("org.links.learn").unwrap().rollout_state,
            RolloutState::Beta
        );
    }

    #[test]
    fn test_invalid_and_duplicate_keys_are_dropped() {
        let sink = MemoryWarningSink::new();
        let snapshot = FlagSnapshot::from_definitions(
            vec![
                FlagDefinition::new("org.links.store", FlagType::Boolean, RolloutState::On),
                FlagDefinition::new("org.links.store", FlagType::Boolean, RolloutState::Off),
                FlagDefinition::new("nodots", FlagType::Boolean, RolloutState::On),
            ],
            &sink,
        );

        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot.get("org.links.store").unwrap().rollout_state,
            RolloutState::On
        );
        assert_eq!(
            sink.warnings(),
            vec![
                ConfigurationWarning::DuplicateKey {
                    key: "org.links.store".into()
                },
                ConfigurationWarning::InvalidKey {
                    key: "nodots".into()
                },
            ]
        );
    }

    #[test]
    fn test_unreadable_definition_costs_only_that_flag() {
        let sink = MemoryWarningSink::new();
        let snapshot = FlagSnapshot::from_json(
            r#"{"version": "7", "flags": [
                {"key": "org.links.store", "type": "boolean", "rolloutState": "on"},
                {"key": "org.links.learn", "type": "bool", "rolloutState": "on"},
                {"key": "org.links.press", "type": "percentage", "rolloutState": "beta",
                 "percentageRollout": "50"},
                {"key": "org.forum.enabled", "type": "boolean", "rolloutState": "later"}
            ]}"#,
            &sink,
        )
        .unwrap();

        assert_eq!(snapshot.version(), Some("7"));
        assert_eq!(snapshot.keys(), vec!["org.links.store"]);

        let skipped: Vec<String> = sink
            .warnings()
            .iter()
            .map(|w| {
                assert!(matches!(w, ConfigurationWarning::Unparseable { .. }));
                w.key().to_string()
            })
            .collect();
        assert_eq!(
            skipped,
            vec!["org.links.learn", "org.links.press", "org.forum.enabled"]
        );
    }

    #[test]
    fn test_unknown_role_names_are_reported_at_load() {
        let sink = MemoryWarningSink::new();
        let snapshot = FlagSnapshot::from_json(
            r#"[{"key": "org.services.manage", "type": "boolean", "scope": "role",
                 "rolloutState": "beta", "enabledForRoles": ["servce_provider"]}]"#,
            &sink,
        )
        .unwrap();

        assert!(snapshot
            .get("org.services.manage")
            .unwrap()
            .enabled_for_roles
            .is_empty());
        assert!(matches!(
            sink.warnings().as_slice(),
            [ConfigurationWarning::InvalidField { field: "enabledForRoles", .. }]
        ));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let sink = MemoryWarningSink::new();
        let result = FlagSnapshot::from_json("{not json", &sink);
        assert!(matches!(result, Err(GatehouseError::FlagSource(_))));
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.json");
        std::fs::write(
            &path,
            r#"[{"key": "org.links.store", "type": "boolean", "rolloutState": "on"}]"#,
        )
        .unwrap();

        let sink = MemoryWarningSink::new();
        let store = FlagStore::load(&FileFlagSource::new(&path), &sink)
            .await
            .unwrap();
        assert!(store.snapshot().get("org.links.store").is_some());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let sink = MemoryWarningSink::new();
        let result = FileFlagSource::new("/definitely/not/here.json")
            .fetch(&sink)
            .await;
        assert!(matches!(result, Err(GatehouseError::FlagSource(_))));
    }

    #[test]
    fn test_replace_keeps_old_snapshot_alive() {
        let mut store = FlagStore::default();
        let before = store.snapshot();

        let sink = MemoryWarningSink::new();
        store.replace(FlagSnapshot::from_definitions(
            vec![FlagDefinition::new(
                "org.links.store",
                FlagType::Boolean,
                RolloutState::On,
            )],
            &sink,
        ));

        assert!(before.is_empty());
        assert_eq!(store.snapshot().len(), 1);
    }
}
