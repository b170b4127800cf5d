//! Helpers shared by the HTTP backends.

use crate::config::HttpSettings;
use crate::core::error::{BackendError, BackendResult, ConfigError};
use crate::core::record::ScannerRecord;

use secrecy::SecretString;

/// Builds a client honoring the timeout and certificate settings.
pub(crate) fn build_client(http: &HttpSettings) -> BackendResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(http.timeout)
        .danger_accept_invalid_certs(http.accept_invalid_certs)
        .build()
        .map_err(|e| ConfigError::invalid(format!("failed to create HTTP client: {e}")).into())
}

/// Converts a request failure into a transport error.
pub(crate) fn transport(backend: &str, err: reqwest::Error) -> BackendError {
    BackendError::transport(backend, err.to_string())
}

/// Returns an error unless the response status is exactly 200.
pub(crate) fn require_ok(
    backend: &str,
    operation: &str,
    response: reqwest::Response,
) -> BackendResult<reqwest::Response> {
    if response.status() == reqwest::StatusCode::OK {
        Ok(response)
    } else {
        Err(BackendError::status(backend, response.status().as_u16(), operation))
    }
}

/// Reads a required string setting.
pub(crate) fn required_str(record: &ScannerRecord, field: &str) -> Result<String, ConfigError> {
    record
        .setting_str(field)
        .map(String::from)
        .ok_or_else(|| ConfigError::MissingField { field: field.to_string() })
}

/// Reads a required credential setting.
pub(crate) fn required_secret(record: &ScannerRecord, field: &str) -> Result<SecretString, ConfigError> {
    required_str(record, field).map(|s| SecretString::new(s.into()))
}

/// Strips trailing slashes from a base URL.
pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
