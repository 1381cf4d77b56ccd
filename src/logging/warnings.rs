//! Configuration warning sinks
//!
//! Flag evaluation never fails on bad configuration. It falls back to the
//! default and hands a [`ConfigurationWarning`] to one of these sinks.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use crate::types::ConfigurationWarning;

/// Destination for configuration warnings
pub trait WarningSink: Send + Sync {
    fn report(&self, warning: &ConfigurationWarning);
}

/// Logs warnings through `tracing`.
///
/// The first warning for a flag key is logged at WARN, repeats at DEBUG, so a
/// malformed flag queried on every render does not flood the log.
#[derive(Default)]
pub struct TracingWarningSink {
    seen: DashMap<String, u64>,
}

impl TracingWarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times a warning was reported for this key
    pub fn count(&self, key: &str) -> u64 {
        self.seen.get(key).map(|c| *c).unwrap_or(0)
    }
}

impl WarningSink for TracingWarningSink {
    fn report(&self, warning: &ConfigurationWarning) {
        let mut count = self.seen.entry(warning.key().to_string()).or_insert(0);
        *count += 1;

        if *count == 1 {
            warn!(flag = %warning.key(), "Flag configuration warning: {}", warning);
        } else {
            debug!(flag = %warning.key(), repeats = *count, "Flag configuration warning: {}", warning);
        }
    }
}

/// Collects warnings in memory
#[derive(Default, Clone)]
pub struct MemoryWarningSink {
    warnings: Arc<Mutex<Vec<ConfigurationWarning>>>,
}

impl MemoryWarningSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<ConfigurationWarning> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.lock().map(|w| w.is_empty()).unwrap_or(true)
    }
}

impl WarningSink for MemoryWarningSink {
    fn report(&self, warning: &ConfigurationWarning) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(warning.clone());
        }
    }
}

/// One line of the warnings log
#[derive(Debug, Clone, Serialize)]
pub struct WarningRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub flag: &'a str,
    pub message: String,
    #[serde(flatten)]
    pub warning: &'a ConfigurationWarning,
}

impl<'a> WarningRecord<'a> {
    pub fn new(warning: &'a ConfigurationWarning) -> Self {
        Self {
            timestamp: Utc::now(),
            flag: warning.key(),
            message: warning.to_string(),
            warning,
        }
    }

    /// Convert to JSONL line
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Appends warnings to a JSONL file, one record per line
#[derive(Clone)]
pub struct JsonlWarningSink {
    writer: Arc<Mutex<BufWriter<File>>>,
    path: PathBuf,
}

impl JsonlWarningSink {
    /// Open (or create) the log file for appending
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!("Flag warning log initialized to {}", path.display());
        Ok(Self {
            writer: Arc::new(Mutex::new(BufWriter::new(file))),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WarningSink for JsonlWarningSink {
    fn report(&self, warning: &ConfigurationWarning) {
        let jsonl = match WarningRecord::new(warning).to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize flag warning: {}", e);
                return;
            }
        };

        let Ok(mut writer) = self.writer.lock() else {
            error!("Flag warning log lock poisoned");
            return;
        };

        if let Err(e) = writeln!(writer, "{}", jsonl) {
            error!("Failed to write flag warning: {}", e);
        }
        if let Err(e) = writer.flush() {
            error!("Failed to flush flag warning log: {}", e);
        }
    }
}

/// Fans a warning out to several sinks
pub struct TeeWarningSink {
    sinks: Vec<Arc<dyn WarningSink>>,
}

impl TeeWarningSink {
    pub fn new(sinks: Vec<Arc<dyn WarningSink>>) -> Self {
        Self { sinks }
    }
}

impl WarningSink for TeeWarningSink {
    fn report(&self, warning: &ConfigurationWarning) {
        for sink in &self.sinks {
            sink.report(warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_percentage() -> ConfigurationWarning {
        ConfigurationWarning::MissingField {
            key: "org.store.discount".into(),
            field: "percentageRollout",
        }
    }

    #[test]
    fn test_record_serialization() {
        let warning = missing_percentage();
        let jsonl = WarningRecord::new(&warning).to_jsonl().unwrap();
        assert!(jsonl.contains("\"kind\":\"missing_field\""));
        assert!(jsonl.contains("\"flag\":\"org.store.discount\""));
        assert!(jsonl.contains("percentageRollout"));
    }

    #[test]
    fn test_tracing_sink_counts_repeats() {
        let sink = TracingWarningSink::new();
        sink.report(&missing_percentage());
        sink.report(&missing_percentage());
        assert_eq!(sink.count("org.store.discount"), 2);
        assert_eq!(sink.count("org.links.store"), 0);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warnings.jsonl");

        let sink = JsonlWarningSink::open(&path).unwrap();
        sink.report(&missing_percentage());
        sink.report(&ConfigurationWarning::InvalidKey { key: "bad".into() });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("invalid_key"));
    }

    #[test]
    fn test_tee_reaches_every_sink() {
        let a = MemoryWarningSink::new();
        let b = MemoryWarningSink::new();
        let tee = TeeWarningSink::new(vec![Arc::new(a.clone()), Arc::new(b.clone())]);

        tee.report(&missing_percentage());

        assert_eq!(a.warnings().len(), 1);
        assert_eq!(b.warnings(), vec![missing_percentage()]);
    }
}
