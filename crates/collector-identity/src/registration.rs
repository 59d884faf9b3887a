//! One-shot collector registration.
//!
//! Exchanges the configured access pair for a collector credential pair via
//! `POST {base_url}/api/v1/collector/register`. Failures are returned as-is;
//! retrying is the caller's business.

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{ExtensionConfig, REGISTER_URL};
use crate::credentials::{basic_auth_value, AccessCredentials, CollectorCredentials, RegistrationInfo};
use crate::error::RegistrationError;
use crate::transport::error_body;

/// Collector attributes sent along with the registration.
#[derive(Debug, Clone, Default)]
pub struct RegistrationMetadata {
    pub description: String,
    pub category: String,
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub ephemeral: bool,
    pub clobber: bool,
    pub time_zone: String,
}

impl RegistrationMetadata {
    pub fn from_config(config: &ExtensionConfig) -> Self {
        Self {
            description: config.collector_description.clone(),
            category: config.collector_category.clone(),
            fields: config.collector_fields.clone(),
            ephemeral: config.ephemeral,
            clobber: config.clobber,
            time_zone: config.time_zone.clone(),
        }
    }
}

/// Body of `POST /api/v1/collector/register`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    collector_name: &'a str,
    description: &'a str,
    category: &'a str,
    fields: &'a serde_json::Map<String, serde_json::Value>,
    hostname: &'a str,
    ephemeral: bool,
    clobber: bool,
    time_zone: &'a str,
}

/// Performs the registration call.
///
/// Uses its own plain client: the registration is authenticated with the
/// access pair, never with collector credentials.
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: String,
    access: AccessCredentials,
}

impl RegistrationClient {
    /// `base_url` must not end with `/`.
    pub fn new(base_url: impl Into<String>, access: AccessCredentials) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, access)
    }

    pub fn with_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        access: AccessCredentials,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            access,
        }
    }

    /// Register `collector_name` and return the credentials issued for it.
    ///
    /// Any status outside `[200, 400)` or a body lacking the collector id
    /// and credential pair is an error; the response body is kept in
    /// [`RegistrationError::Status`] for diagnostics.
    pub async fn register(
        &self,
        collector_name: &str,
        metadata: &RegistrationMetadata,
    ) -> Result<CollectorCredentials, RegistrationError> {
        let hostname = local_hostname().map_err(RegistrationError::Hostname)?;
        let url = format!("{}{REGISTER_URL}", self.base_url);

        let body = RegisterRequest {
            collector_name,
            description: &metadata.description,
            category: &metadata.category,
            fields: &metadata.fields,
            hostname: &hostname,
            ephemeral: metadata.ephemeral,
            clobber: metadata.clobber,
            time_zone: &metadata.time_zone,
        };

        info!(url = %url, "calling register API");
        let res = self
            .http
            .post(&url)
            .header(
                AUTHORIZATION,
                basic_auth_value(&self.access.access_id, &self.access.access_key),
            )
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !(200..400).contains(&status.as_u16()) {
            let body = error_body(res).await;
            debug!(status_code = status.as_u16(), response = %body, "collector registration failed");
            return Err(RegistrationError::Status { status, body });
        }

        let bytes = res.bytes().await?;
        let registration: RegistrationInfo = serde_json::from_slice(&bytes)?;

        info!(collector_id = %registration.collector_id, "collector registered");

        Ok(CollectorCredentials {
            collector_name: collector_name.to_string(),
            credentials: registration,
        })
    }
}

/// The machine's hostname, lossily converted to UTF-8.
pub fn local_hostname() -> std::io::Result<String> {
    Ok(hostname::get()?.to_string_lossy().into_owned())
}
