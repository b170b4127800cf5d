//! The backend registry.
//!
//! Maps each backend-type discriminant to its descriptor: display name,
//! configuration schemas and the factory that turns a scanner record into a
//! live backend. The registry is assembled once, before the sweeper or any
//! caller touches it, and is immutable afterwards.

use crate::config::HttpSettings;
use crate::core::error::{BackendResult, ConfigError};
use crate::core::record::ScannerRecord;
use crate::core::schema::{ConfigSchema, Settings};
use crate::core::traits::ArcBackend;
use crate::core::types::BackendKind;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a backend for one scanner record.
pub type BackendFactory = Arc<dyn Fn(&ScannerRecord, &HttpSettings) -> BackendResult<ArcBackend> + Send + Sync>;

/// Everything the orchestration layer knows about one backend kind.
#[derive(Clone)]
pub struct BackendDescriptor {
    /// Discriminant stored on scanner records.
    pub kind: BackendKind,
    /// Human-readable name.
    pub display_name: String,
    /// Schema of `ScannerRecord::settings`.
    pub scanner_schema: ConfigSchema,
    /// Schema of `ScanRecord::options`.
    pub scan_schema: ConfigSchema,
    factory: BackendFactory,
}

impl BackendDescriptor {
    /// Creates a descriptor with empty schemas.
    pub fn new<F>(kind: impl Into<BackendKind>, display_name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ScannerRecord, &HttpSettings) -> BackendResult<ArcBackend> + Send + Sync + 'static,
    {
        Self {
            kind: kind.into(),
            display_name: display_name.into(),
            scanner_schema: ConfigSchema::default(),
            scan_schema: ConfigSchema::default(),
            factory: Arc::new(factory),
        }
    }

    /// Creates a descriptor that hands out the same backend for every
    /// scanner. Useful for in-process backends and tests.
    pub fn shared(kind: impl Into<BackendKind>, display_name: impl Into<String>, backend: ArcBackend) -> Self {
        Self::new(kind, display_name, move |_, _| Ok(backend.clone()))
    }

    /// Sets the scanner settings schema.
    pub fn with_scanner_schema(mut self, schema: ConfigSchema) -> Self {
        self.scanner_schema = schema;
        self
    }

    /// Sets the scan options schema.
    pub fn with_scan_schema(mut self, schema: ConfigSchema) -> Self {
        self.scan_schema = schema;
        self
    }

    /// Builds a backend for `record`.
    pub fn instantiate(&self, record: &ScannerRecord, http: &HttpSettings) -> BackendResult<ArcBackend> {
        (self.factory)(record, http)
    }

    /// Descriptor of the Nessus backend.
    #[cfg(feature = "nessus")]
    pub fn nessus() -> Self {
        use crate::backends::nessus;
        Self::new(nessus::KIND, "Nessus", |record, http| {
            let backend: ArcBackend = Arc::new(nessus::NessusBackend::from_record(record, http)?);
            Ok(backend)
        })
        .with_scanner_schema(nessus::scanner_schema())
        .with_scan_schema(nessus::scan_schema())
    }

    /// Descriptor of the Burp Suite backend.
    #[cfg(feature = "burp")]
    pub fn burp() -> Self {
        use crate::backends::burp;
        Self::new(burp::KIND, "Burp Suite", |record, http| {
            let backend: ArcBackend = Arc::new(burp::BurpBackend::from_record(record, http)?);
            Ok(backend)
        })
        .with_scanner_schema(burp::scanner_schema())
        .with_scan_schema(burp::scan_schema())
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("kind", &self.kind)
            .field("display_name", &self.display_name)
            .field("scanner_schema", &self.scanner_schema)
            .field("scan_schema", &self.scan_schema)
            .finish_non_exhaustive()
    }
}

/// Immutable map from backend kind to descriptor.
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    descriptors: BTreeMap<BackendKind, BackendDescriptor>,
}

impl BackendRegistry {
    /// Starts building a registry.
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// A registry holding every backend compiled into this build.
    pub fn builtin() -> Self {
        Self::builder().with_builtin().build()
    }

    /// Looks up a descriptor.
    pub fn get(&self, kind: &BackendKind) -> Result<&BackendDescriptor, ConfigError> {
        self.descriptors.get(kind).ok_or_else(|| ConfigError::UnknownBackend {
            kind: kind.to_string(),
        })
    }

    /// Returns `true` if `kind` is registered.
    pub fn contains(&self, kind: &BackendKind) -> bool {
        self.descriptors.contains_key(kind)
    }

    /// Iterates over the descriptors in kind order.
    pub fn descriptors(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.descriptors.values()
    }

    /// Returns the number of registered kinds.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Builds the backend serving `record`.
    pub fn instantiate(&self, record: &ScannerRecord, http: &HttpSettings) -> BackendResult<ArcBackend> {
        self.get(&record.backend)?.instantiate(record, http)
    }

    /// Validates a scanner record's settings against its backend's schema.
    pub fn validate_scanner(&self, record: &ScannerRecord) -> Result<(), ConfigError> {
        self.get(&record.backend)?.scanner_schema.validate(&record.settings)
    }

    /// Validates scan options against the schema of backend `kind`.
    pub fn validate_scan_options(&self, kind: &BackendKind, options: &Settings) -> Result<(), ConfigError> {
        self.get(kind)?.scan_schema.validate(options)
    }
}

/// Builder for [`BackendRegistry`].
#[derive(Debug, Default)]
pub struct BackendRegistryBuilder {
    descriptors: BTreeMap<BackendKind, BackendDescriptor>,
}

impl BackendRegistryBuilder {
    /// Registers a descriptor, replacing any earlier one of the same kind.
    pub fn register(mut self, descriptor: BackendDescriptor) -> Self {
        if let Some(previous) = self.descriptors.insert(descriptor.kind.clone(), descriptor) {
            tracing::warn!(backend = %previous.kind, "Replacing registered backend");
        }
        self
    }

    /// Registers every backend compiled into this build.
    #[allow(unused_mut)]
    pub fn with_builtin(mut self) -> Self {
        #[cfg(feature = "nessus")]
        {
            self = self.register(BackendDescriptor::nessus());
        }
        #[cfg(feature = "burp")]
        {
            self = self.register(BackendDescriptor::burp());
        }
        self
    }

    /// Finishes the registry.
    pub fn build(self) -> BackendRegistry {
        tracing::debug!(
            kinds = ?self.descriptors.keys().map(BackendKind::as_str).collect::<Vec<_>>(),
            "Backend registry built"
        );
        BackendRegistry {
            descriptors: self.descriptors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::mock::{self, MockBackend};
    use crate::core::schema::ConfigField;
    use serde_json::json;

    fn mock_registry() -> BackendRegistry {
        BackendRegistry::builder()
            .register(
                BackendDescriptor::shared(mock::KIND, "Mock", Arc::new(MockBackend::new()))
                    .with_scanner_schema(ConfigSchema::new([ConfigField::string("api_url", "API URL")])),
            )
            .build()
    }

    #[test]
    fn test_unknown_kind_is_config_error() {
        let registry = mock_registry();
        let record = ScannerRecord::new("x", "qualys");
        assert!(matches!(
            registry.instantiate(&record, &HttpSettings::default()),
            Err(crate::core::BackendError::Configuration(ConfigError::UnknownBackend { .. }))
        ));
    }

    #[test]
    fn test_shared_descriptor_instantiates() {
        let registry = mock_registry();
        let record = ScannerRecord::new("m", mock::KIND).with_setting("api_url", "http://x");
        assert!(registry.validate_scanner(&record).is_ok());

        let backend = registry.instantiate(&record, &HttpSettings::default()).unwrap();
        assert_eq!(backend.kind(), mock::KIND);
    }

    #[test]
    fn test_validation_uses_schemas() {
        let registry = mock_registry();
        let record = ScannerRecord::new("m", mock::KIND).with_setting("api_url", 5);
        assert!(registry.validate_scanner(&record).is_err());

        let options = json!({"anything": 1}).as_object().cloned().unwrap();
        assert!(matches!(
            registry.validate_scan_options(&mock::KIND.into(), &options),
            Err(ConfigError::UnknownField { .. })
        ));
    }

    #[cfg(all(feature = "nessus", feature = "burp"))]
    #[test]
    fn test_builtin_registry() {
        let registry = BackendRegistry::builtin();
        let kinds: Vec<_> = registry.descriptors().map(|d| d.kind.as_str().to_string()).collect();
        assert_eq!(kinds, vec!["burp_suite", "nessus"]);

        let nessus = registry.get(&"nessus".into()).unwrap();
        let names: Vec<_> = nessus.scanner_schema.fields().iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec!["api_url", "access_key", "secret_key", "default_policy_id", "api_token"]
        );

        let record = ScannerRecord::new("bs", "burp_suite")
            .with_setting("api_url", "http://127.0.0.1:1337")
            .with_setting("api_key", "k");
        let backend = registry.instantiate(&record, &HttpSettings::default()).unwrap();
        assert!(backend.capabilities().fused_create);
        assert_eq!(backend.name(), "bs");
    }
}
