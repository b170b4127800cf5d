//! Runtime configuration.
//!
//! [`AutomationConfig`] gathers every tunable of the sweeper, the worker pool,
//! the export driver and the HTTP backends. It can be built in code with the
//! `with_*` methods or loaded from TOML:
//!
//! ```toml
//! sweep_interval_secs = 60
//! max_concurrent_tasks = 4
//!
//! [export]
//! poll_interval_secs = 10
//! max_wait_secs = 600
//!
//! [http]
//! timeout_secs = 5
//! accept_invalid_certs = true
//! ```

use crate::core::error::ConfigError;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&d.as_secs()),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(d).map(|v| v.map(Duration::from_secs))
        }
    }
}

/// Settings of the export wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Interval between export status polls.
    #[serde(rename = "poll_interval_secs", with = "secs")]
    pub poll_interval: Duration,
    /// How long one retrieval may wait before it is suspended.
    /// `None` waits until the export is ready.
    #[serde(rename = "max_wait_secs", with = "secs::option", skip_serializing_if = "Option::is_none")]
    pub max_wait: Option<Duration>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_wait: None,
        }
    }
}

impl ExportConfig {
    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the wait budget.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

/// Settings shared by the HTTP backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    /// Per-request timeout.
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    /// Accept self-signed and otherwise invalid TLS certificates.
    ///
    /// On-premise scanner consoles commonly ship with self-signed
    /// certificates, so this defaults to `true`.
    pub accept_invalid_certs: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            accept_invalid_certs: true,
        }
    }
}

impl HttpSettings {
    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets whether invalid certificates are accepted.
    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

/// Configuration of the automation runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// Period between sweeps.
    #[serde(rename = "sweep_interval_secs", with = "secs")]
    pub sweep_interval: Duration,
    /// Maximum number of dispatched actions executing at once.
    pub max_concurrent_tasks: usize,
    /// Export wait settings.
    pub export: ExportConfig,
    /// HTTP backend settings.
    pub http: HttpSettings,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            max_concurrent_tasks: 4,
            export: ExportConfig::default(),
            http: HttpSettings::default(),
        }
    }
}

impl AutomationConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a TOML document. Absent keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::invalid(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::invalid("sweep_interval_secs must be positive"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::invalid("max_concurrent_tasks must be positive"));
        }
        if self.export.poll_interval.is_zero() {
            return Err(ConfigError::invalid("export.poll_interval_secs must be positive"));
        }
        if self.export.max_wait.is_some_and(|budget| budget < self.export.poll_interval) {
            return Err(ConfigError::invalid(
                "export.max_wait_secs must be at least export.poll_interval_secs",
            ));
        }
        Ok(())
    }

    /// Sets the sweep period.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Sets the concurrency limit.
    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    /// Sets the export settings.
    pub fn with_export(mut self, export: ExportConfig) -> Self {
        self.export = export;
        self
    }

    /// Sets the HTTP settings.
    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AutomationConfig::default();
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.max_concurrent_tasks, 4);
        assert_eq!(config.export.poll_interval, Duration::from_secs(10));
        assert_eq!(config.export.max_wait, None);
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert!(config.http.accept_invalid_certs);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = AutomationConfig::from_toml_str(
            r#"
            max_concurrent_tasks = 8

            [export]
            max_wait_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_tasks, 8);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.export.poll_interval, Duration::from_secs(10));
        assert_eq!(config.export.max_wait, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(AutomationConfig::from_toml_str("max_concurrent_tasks = 0").is_err());
        assert!(AutomationConfig::from_toml_str("sweep_interval_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_wait_budget_must_cover_one_poll() {
        assert!(AutomationConfig::from_toml_str("[export]\nmax_wait_secs = 0").is_err());
        assert!(AutomationConfig::from_toml_str("[export]\nmax_wait_secs = 5").is_err());
        assert!(AutomationConfig::from_toml_str("[export]\npoll_interval_secs = 5\nmax_wait_secs = 5").is_ok());
        assert!(AutomationConfig::from_toml_str("[export]\nmax_wait_secs = 10").is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sweep_interval_secs = 30\n[http]\naccept_invalid_certs = false").unwrap();

        let config = AutomationConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sweep_interval, Duration::from_secs(30));
        assert!(!config.http.accept_invalid_certs);
        assert_eq!(config.http.timeout, Duration::from_secs(5));

        assert!(AutomationConfig::from_file("/nonexistent/scanpilot.toml").is_err());
    }

    #[test]
    fn test_builder_roundtrip_through_toml() {
        let config = AutomationConfig::new()
            .with_sweep_interval(Duration::from_secs(15))
            .with_export(ExportConfig::default().with_max_wait(Duration::from_secs(120)));
        let text = toml::to_string(&config).unwrap();
        assert_eq!(AutomationConfig::from_toml_str(&text).unwrap(), config);
    }
}
