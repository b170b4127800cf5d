//! Nessus scanning backend.
//!
//! This module drives jobs on a Nessus console through its REST API.
//!
//! # Requirements
//!
//! - A Nessus API access key and secret key
//! - Network access to the console (usually port 8834)
//!
//! # API Usage
//!
//! 1. `POST /scans` creates the job, `POST /scans/{id}/launch` starts it
//! 2. `GET /scans/{id}` reports `info.status`
//! 3. Results are fetched through a CSV export: `POST /scans/{id}/export`,
//!    then `GET /tokens/{token}/status` until ready, then
//!    `GET /tokens/{token}/download`

use crate::backends::http;
use crate::config::HttpSettings;
use crate::core::error::{BackendError, BackendResult, ConfigError};
use crate::core::record::ScannerRecord;
use crate::core::schema::{ConfigField, ConfigSchema};
use crate::core::traits::{Backend, Capabilities, JobPoll, JobRequest, RetrievalContext, RetrieveOutcome};
use crate::core::types::JobHandle;
use crate::export::{ExportApi, ExportFormat, ExportRetriever, ExportStatus, ExportToken};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

/// Backend-type discriminant of the Nessus backend.
pub const KIND: &str = "nessus";

/// Scan template identifier sent on create. Nessus accepts any UUID
/// followed by sixteen hex characters here.
const TEMPLATE_UUID: &str = "ad629e16-03b6-8c1d-cef6-ef8c9dd3c658d24bd260ef5f9e66";

/// Scanner settings schema.
pub fn scanner_schema() -> ConfigSchema {
    ConfigSchema::new([
        ConfigField::string("api_url", "API URL"),
        ConfigField::secret("access_key", "API Access Key"),
        ConfigField::secret("secret_key", "API Secret Key"),
        ConfigField::optional_integer("default_policy_id", "Default policy ID for scans (optional)"),
        ConfigField::optional_secret("api_token", "Web UI API token (optional)"),
    ])
}

/// Scan options schema.
pub fn scan_schema() -> ConfigSchema {
    ConfigSchema::new([ConfigField::optional_integer(
        "override_policy_id",
        "Override policy ID (optional)",
    )])
}

/// Nessus backend configuration.
#[derive(Debug, Clone)]
pub struct NessusConfig {
    /// Base URL of the console API.
    pub api_url: String,
    /// API access key (kept secret).
    pub access_key: SecretString,
    /// API secret key (kept secret).
    pub secret_key: SecretString,
    /// Policy used when a scan does not override it.
    pub default_policy_id: Option<i64>,
    /// Token sent as `X-Api-Token` on create and launch. Nessus
    /// Professional rejects those calls from API keys alone.
    pub api_token: Option<SecretString>,
}

impl NessusConfig {
    /// Creates a configuration with the given endpoint and keys.
    pub fn new(api_url: impl Into<String>, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            api_url: http::trim_base(&api_url.into()),
            access_key: SecretString::new(access_key.into().into()),
            secret_key: SecretString::new(secret_key.into().into()),
            default_policy_id: None,
            api_token: None,
        }
    }

    /// Reads the configuration from a scanner record.
    pub fn from_record(record: &ScannerRecord) -> Result<Self, ConfigError> {
        scanner_schema().validate(&record.settings)?;
        Ok(Self {
            api_url: http::trim_base(&http::required_str(record, "api_url")?),
            access_key: http::required_secret(record, "access_key")?,
            secret_key: http::required_secret(record, "secret_key")?,
            default_policy_id: record.setting_i64("default_policy_id"),
            api_token: record
                .setting_str("api_token")
                .map(|t| SecretString::new(t.to_string().into())),
        })
    }

    /// Sets the default policy.
    pub fn with_default_policy(mut self, policy_id: i64) -> Self {
        self.default_policy_id = Some(policy_id);
        self
    }

    /// Sets the web UI API token.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::new(token.into().into()));
        self
    }
}

/// Nessus backend implementation.
///
/// # Example
///
/// ```rust,ignore
/// use scanpilot::backends::nessus::{NessusBackend, NessusConfig};
/// use scanpilot::config::HttpSettings;
///
/// let config = NessusConfig::new("https://nessus.local:8834", "access", "secret");
/// let backend = NessusBackend::new("primary", config, &HttpSettings::default())?;
/// ```
#[derive(Debug)]
pub struct NessusBackend {
    name: String,
    config: NessusConfig,
    client: reqwest::Client,
}

impl NessusBackend {
    /// Creates a backend with the given configuration.
    pub fn new(name: impl Into<String>, config: NessusConfig, http_settings: &HttpSettings) -> BackendResult<Self> {
        Ok(Self {
            name: name.into(),
            config,
            client: http::build_client(http_settings)?,
        })
    }

    /// Creates a backend from a scanner record.
    pub fn from_record(record: &ScannerRecord, http_settings: &HttpSettings) -> BackendResult<Self> {
        let config = NessusConfig::from_record(record)?;
        Self::new(record.name.clone(), config, http_settings)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.header(
            "X-ApiKeys",
            format!(
                "accessKey={}; secretKey={};",
                self.config.access_key.expose_secret(),
                self.config.secret_key.expose_secret()
            ),
        )
    }

    fn privileged(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = self.auth(request);
        match &self.config.api_token {
            Some(token) => request.header("X-Api-Token", token.expose_secret()),
            None => request,
        }
    }

    async fn json(&self, operation: &str, response: reqwest::Response) -> BackendResult<Value> {
        let response = http::require_ok(KIND, operation, response)?;
        response
            .json()
            .await
            .map_err(|e| BackendError::protocol(KIND, format!("{operation}: {e}")))
    }

    async fn try_create(&self, request: &JobRequest) -> BackendResult<JobHandle> {
        let mut settings = json!({
            "name": request.name,
            "text_targets": request.targets.join(","),
        });
        if let Some(policy_id) = request
            .option_i64("override_policy_id")
            .or(self.config.default_policy_id)
        {
            settings["policy_id"] = json!(policy_id);
        }
        let body = json!({ "uuid": TEMPLATE_UUID, "settings": settings });

        let response = self
            .privileged(self.client.post(self.url("/scans")))
            .json(&body)
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let body = self.json("create", response).await?;

        match &body["scan"]["id"] {
            Value::Number(id) => Ok(JobHandle::new(id.to_string())),
            Value::String(id) => Ok(JobHandle::new(id.clone())),
            _ => Err(BackendError::protocol(KIND, "create response has no scan.id")),
        }
    }

    async fn try_launch(&self, handle: &JobHandle) -> BackendResult<()> {
        let response = self
            .privileged(self.client.post(self.url(&format!("/scans/{handle}/launch"))))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        http::require_ok(KIND, "launch", response).map(|_| ())
    }

    async fn try_poll(&self, handle: &JobHandle) -> BackendResult<JobPoll> {
        let response = self
            .auth(self.client.get(self.url(&format!("/scans/{handle}"))))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let body = self.json("poll", response).await?;

        match body["info"]["status"].as_str() {
            Some("completed") => Ok(JobPoll::Done),
            Some("aborted" | "canceled") => Ok(JobPoll::Failed),
            Some(_) => Ok(JobPoll::Running),
            None => Err(BackendError::protocol(KIND, "poll response has no info.status")),
        }
    }
}

#[async_trait]
impl Backend for NessusBackend {
    fn kind(&self) -> &str {
        KIND
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::two_step()
    }

    async fn create_job(&self, request: &JobRequest) -> Option<JobHandle> {
        match self.try_create(request).await {
            Ok(handle) => {
                tracing::debug!(backend = %self.name, job = %handle, "Nessus scan created");
                Some(handle)
            }
            Err(e) => {
                tracing::error!(backend = %self.name, error = %e, "Nessus scan creation failed");
                None
            }
        }
    }

    async fn start_job(&self, handle: &JobHandle) -> bool {
        match self.try_launch(handle).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(backend = %self.name, job = %handle, error = %e, "Nessus scan launch failed");
                false
            }
        }
    }

    async fn poll_job(&self, handle: &JobHandle) -> JobPoll {
        match self.try_poll(handle).await {
            Ok(poll) => poll,
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    backend = %self.name,
                    job = %handle,
                    error = %e,
                    "Nessus poll failed, treating as running"
                );
                JobPoll::Running
            }
            Err(e) => {
                tracing::error!(backend = %self.name, job = %handle, error = %e, "Nessus poll response malformed");
                JobPoll::Failed
            }
        }
    }

    async fn retrieve_job(&self, handle: &JobHandle, ctx: &RetrievalContext) -> RetrieveOutcome {
        ExportRetriever::new(self, &self.name)
            .with_format(ExportFormat::Csv)
            .run(handle, ctx)
            .await
    }
}

#[async_trait]
impl ExportApi for NessusBackend {
    async fn request_export(&self, handle: &JobHandle, format: ExportFormat) -> BackendResult<ExportToken> {
        let response = self
            .auth(self.client.post(self.url(&format!("/scans/{handle}/export"))))
            .json(&json!({ "format": format.as_str() }))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let body = self.json("export request", response).await?;

        match &body["token"] {
            Value::String(token) => Ok(ExportToken::new(token.clone())),
            Value::Number(token) => Ok(ExportToken::new(token.to_string())),
            _ => Err(BackendError::protocol(KIND, "export response has no token")),
        }
    }

    async fn export_status(&self, token: &ExportToken) -> BackendResult<ExportStatus> {
        let response = self
            .auth(self.client.get(self.url(&format!("/tokens/{token}/status"))))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let body = self.json("export status", response).await?;

        match body["status"].as_str() {
            Some("ready") => Ok(ExportStatus::Ready),
            Some(_) => Ok(ExportStatus::NotReady),
            None => Err(BackendError::protocol(KIND, "export status response has no status")),
        }
    }

    async fn download_export(&self, token: &ExportToken) -> BackendResult<Vec<u8>> {
        let response = self
            .auth(self.client.get(self.url(&format!("/tokens/{token}/download"))))
            .send()
            .await
            .map_err(|e| http::transport(KIND, e))?;
        let response = http::require_ok(KIND, "export download", response)?;
        let bytes = response.bytes().await.map_err(|e| http::transport(KIND, e))?;

        Ok(bytes.iter().copied().filter(|&b| b != b'\r').collect())
    }
}
