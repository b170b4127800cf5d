//! Persisted scanner and scan records.

use crate::core::schema::Settings;
use crate::core::types::{BackendKind, JobHandle, ScanId, ScanStatus, ScannerId};
use crate::export::ExportProgress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured connection to one backend.
///
/// `settings` holds the backend-specific configuration (endpoint,
/// credentials, defaults), validated against the backend's scanner schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerRecord {
    /// Unique identifier.
    pub id: ScannerId,
    /// Unique, user-chosen name.
    pub name: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
    /// Which backend implementation serves this scanner.
    pub backend: BackendKind,
    /// Backend-specific configuration.
    #[serde(default)]
    pub settings: Settings,
}

impl ScannerRecord {
    /// Creates a scanner record for the given backend.
    pub fn new(name: impl Into<String>, backend: impl Into<BackendKind>) -> Self {
        Self {
            id: ScannerId::new(),
            name: name.into(),
            created_at: Utc::now(),
            notes: String::new(),
            backend: backend.into(),
            settings: Settings::new(),
        }
    }

    /// Sets the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Sets a configuration value.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Replaces all configuration values.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns a string setting, if present.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(|v| v.as_str())
    }

    /// Returns an integer setting, if present and not null.
    pub fn setting_i64(&self, key: &str) -> Option<i64> {
        self.settings.get(key).and_then(|v| v.as_i64())
    }
}

/// Which lifecycle steps the sweeper may perform on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationFlags {
    /// Create the job when the scan is NEW.
    pub auto_create: bool,
    /// Launch the job when the scan is CREATED.
    pub auto_start: bool,
    /// Fetch the artifact when the scan is FINISHED.
    pub auto_retrieve: bool,
}

impl AutomationFlags {
    /// No automation; every step is manual.
    pub fn manual() -> Self {
        Self::default()
    }

    /// Every step is automated.
    pub fn all() -> Self {
        Self {
            auto_create: true,
            auto_start: true,
            auto_retrieve: true,
        }
    }

    /// Sets auto-create.
    pub fn with_create(mut self, enabled: bool) -> Self {
        self.auto_create = enabled;
        self
    }

    /// Sets auto-start.
    pub fn with_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    /// Sets auto-retrieve.
    pub fn with_retrieve(mut self, enabled: bool) -> Self {
        self.auto_retrieve = enabled;
        self
    }
}

/// Reference to a stored result artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultRef {
    /// Blob-store key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// BLAKE3 digest of the content, hex encoded.
    pub blake3: String,
}

/// One job instance tracked through its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Unique identifier.
    pub id: ScanId,
    /// Owning scanner.
    pub scanner_id: ScannerId,
    /// Unique, user-chosen name.
    pub name: String,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last launched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job was last observed finished (or stopped).
    pub ended_at: Option<DateTime<Utc>>,
    /// Free-form notes.
    #[serde(default)]
    pub notes: String,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: ScanStatus,
    /// Automation flags.
    #[serde(default)]
    pub automation: AutomationFlags,
    /// Targets (hosts or URLs), separated by commas or newlines.
    pub target: String,
    /// Backend-specific scan options, validated against the scan schema.
    #[serde(default)]
    pub options: Settings,
    /// Remote job handle, set once create succeeds.
    pub job_handle: Option<JobHandle>,
    /// Stored artifact, set iff `status` is `Retrieved`.
    pub result: Option<ResultRef>,
    /// Progress of an asynchronous export, if one is underway.
    #[serde(default)]
    pub export: Option<ExportProgress>,
}

impl ScanRecord {
    /// Creates a NEW scan under the given scanner.
    pub fn new(scanner_id: ScannerId, name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: ScanId::new(),
            scanner_id,
            name: name.into(),
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            notes: String::new(),
            status: ScanStatus::New,
            automation: AutomationFlags::default(),
            target: target.into(),
            options: Settings::new(),
            job_handle: None,
            result: None,
            export: None,
        }
    }

    /// Sets the automation flags.
    pub fn with_automation(mut self, automation: AutomationFlags) -> Self {
        self.automation = automation;
        self
    }

    /// Sets a backend-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Sets the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Sets the status. Intended for seeding fixtures and imports.
    pub fn with_status(mut self, status: ScanStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the job handle. Intended for seeding fixtures and imports.
    pub fn with_job_handle(mut self, handle: impl Into<String>) -> Self {
        self.job_handle = Some(JobHandle::new(handle));
        self
    }

    /// Returns the target split on commas, trimmed, empties removed.
    pub fn target_list(&self) -> Vec<String> {
        self.target
            .split([',', '\n'])
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }
}

impl std::fmt::Display for ScanRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, \"{}\"", self.id, self.status.code(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_scan_defaults() {
        let scan = ScanRecord::new(ScannerId::new(), "nightly", "https://a.example, https://b.example");
        assert_eq!(scan.status, ScanStatus::New);
        assert!(scan.job_handle.is_none());
        assert!(scan.result.is_none());
        assert_eq!(scan.automation, AutomationFlags::manual());
        assert_eq!(scan.target_list(), vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_scanner_settings_accessors() {
        let scanner = ScannerRecord::new("ns", "nessus")
            .with_setting("api_url", "https://nessus.local:8834")
            .with_setting("default_policy_id", 12)
            .with_setting("missing", serde_json::Value::Null);

        assert_eq!(scanner.setting_str("api_url"), Some("https://nessus.local:8834"));
        assert_eq!(scanner.setting_i64("default_policy_id"), Some(12));
        assert_eq!(scanner.setting_i64("missing"), None);
    }

    #[test]
    fn test_scan_record_serde_uses_status_codes() {
        let scan = ScanRecord::new(ScannerId::from("s"), "n", "t").with_status(ScanStatus::Finished);
        let json = serde_json::to_value(&scan).unwrap();
        assert_eq!(json["status"], "FI");

        let back: ScanRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, scan);
    }
}
