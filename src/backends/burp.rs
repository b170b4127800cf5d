//! Burp Suite scanning backend.
//!
//! Talks to the Burp Suite REST API. Creating a scan also launches it, so
//! this backend has no separate start step.

use crate::backends::http;
use crate::config::HttpSettings;
use crate::core::error::{BackendError, BackendResult, ConfigError};
use crate::core::record::ScannerRecord;
use crate::core::schema::{ConfigField, ConfigSchema};
use crate::core::traits::{Backend, Capabilities, JobPoll, JobRequest, RetrievalContext, RetrieveOutcome};
use crate::core::types::JobHandle;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

/// Backend-type discriminant of the Burp Suite backend.
pub const KIND: &str = "burp_suite";

/// Scanner settings schema.
pub fn scanner_schema() -> ConfigSchema {
    ConfigSchema::new([
        ConfigField::string("api_url", "API URL"),
        ConfigField::secret("api_key", "API Key"),
    ])
}

/// Scan options schema. Burp scans take no options beyond their targets.
pub fn scan_schema() -> ConfigSchema {
    ConfigSchema::default()
}

/// Burp Suite backend configuration.
#[derive(Debug, Clone)]
pub struct BurpConfig {
    /// Base URL of the REST API, e.g. `http://127.0.0.1:1337`.
    pub api_url: String,
    /// API key. It is part of every request path.
    pub api_key: SecretString,
}

impl BurpConfig {
    /// Creates a configuration.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: http::trim_base(&api_url.into()),
            api_key: SecretString::new(api_key.into().into()),
        }
    }

    /// Reads the configuration from a scanner record.
    pub fn from_record(record: &ScannerRecord) -> Result<Self, ConfigError> {
        scanner_schema().validate(&record.settings)?;
        Ok(Self {
            api_url: http::trim_base(&http::required_str(record, "api_url")?),
            api_key: http::required_secret(record, "api_key")?,
        })
    }
}

/// Burp Suite backend implementation.
#[derive(Debug)]
pub struct BurpBackend {
    name: String,
    config: BurpConfig,
    client: reqwest::Client,
}

impl BurpBackend {
    /// Creates a backend with the given configuration.
    pub fn new(name: impl Into<String>, config: BurpConfig, http_settings: &HttpSettings) -> BackendResult<Self> {
        Ok(Self {
            name: name.into(),
            config,
            client: http::build_client(http_settings)?,
        })
    }

    /// Creates a backend from a scanner record.
    pub fn from_record(record: &ScannerRecord, http_settings: &HttpSettings) -> BackendResult<Self> {
        let config = BurpConfig::from_record(record)?;
        Self::new(record.name.clone(), config, http_settings)
    }

    fn scan_url(&self, id: Option<&JobHandle>) -> String {
        let base = format!(
            "{}/{}/v0.1/scan",
            self.config.api_url,
            self.config.api_key.expose_secret()
        );
        match id {
            Some(id) => format!("{base}/{id}"),
            None => base,
        }
    }

    async fn try_create(&self, request: &JobRequest) -> BackendResult<JobHandle> {
        let response = self
            .client
            .post(self.scan_url(None))
            .json(&json!({ "urls": request.targets }))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        if !response.status().is_success() {
            return Err(BackendError::status(KIND, response.status().as_u16(), "create"));
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| BackendError::protocol(KIND, "create response has no Location header"))?;
        location
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .map(JobHandle::new)
            .ok_or_else(|| BackendError::protocol(KIND, format!("cannot read scan id from '{location}'")))
    }

    async fn fetch(&self, handle: &JobHandle, operation: &str) -> BackendResult<reqwest::Response> {
        let response = self
            .client
            .get(self.scan_url(Some(handle)))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(BackendError::status(KIND, response.status().as_u16(), operation))
        }
    }

    async fn try_poll(&self, handle: &JobHandle) -> BackendResult<JobPoll> {
        let body: Value = self
            .fetch(handle, "poll")
            .await?
            .json()
            .await
            .map_err(|e| BackendError::protocol(KIND, format!("poll: {e}")))?;

        match body["scan_status"].as_str() {
            Some("succeeded") => Ok(JobPoll::Done),
            Some("failed") => Ok(JobPoll::Failed),
            Some(_) => Ok(JobPoll::Running),
            None => Err(BackendError::protocol(KIND, "poll response has no scan_status")),
        }
    }

    async fn try_retrieve(&self, handle: &JobHandle) -> BackendResult<Vec<u8>> {
        let bytes = self
            .fetch(handle, "retrieve")
            .await?
            .bytes()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Backend for BurpBackend {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::fused()
    }

    async fn create_job(&self, request: &JobRequest) -> Option<JobHandle> {
        match self.try_create(request).await {
            Ok(handle) => {
                tracing::debug!(backend = %self.name, job = %handle, "Burp scan launched");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(backend = %self.name, error = %e, "Burp scan creation failed");
                None
            }
        }
    }

    async fn start_job(&self, handle: &JobHandle) -> bool {
        tracing::warn!(backend = %self.name, job = %handle, "Burp scans start on create");
        false
    }

    async fn poll_job(&self, handle: &JobHandle) -> JobPoll {
        match self.try_poll(handle).await {
            Ok(poll) => poll,
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    backend = %self.name,
                    job = %handle,
                    error = %e,
                    "Burp poll failed, treating as running"
                );
                JobPoll::Running
            }
            Err(e) => {
                tracing::warn!(backend = %self.name, job = %handle, error = %e, "Burp poll response malformed");
                JobPoll::Failed
            }
        }
    }

    async fn retrieve_job(&self, handle: &JobHandle, _ctx: &RetrievalContext) -> RetrieveOutcome {
        match self.try_retrieve(handle).await {
            Ok(bytes) => RetrieveOutcome::Retrieved(bytes),
            Err(e) => {
                tracing::warn!(backend = %self.name, job = %handle, error = %e, "Burp retrieval failed");
                RetrieveOutcome::Failed
            }
        }
    }
}
