//! Credential types: the access pair from configuration and the collector
//! pair returned by the registration API.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Access id / key pair used to authenticate the registration call.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessCredentials {
    pub access_id: String,
    pub access_key: String,
}

impl AccessCredentials {
    pub fn new(access_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            access_id: access_id.into(),
            access_key: access_key.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.access_id.is_empty() && !self.access_key.is_empty()
    }
}

impl fmt::Debug for AccessCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessCredentials")
            .field("access_id", &self.access_id)
            .field("access_key", &"<redacted>")
            .finish()
    }
}

/// Payload returned by a successful registration.
///
/// * `collector_id`             – identifier of the collector on the backend.
/// * `collector_credential_id`  – user part of the per-request Basic auth.
/// * `collector_credential_key` – secret part of the per-request Basic auth.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationInfo {
    pub collector_id: String,
    pub collector_credential_id: String,
    pub collector_credential_key: String,
}

impl RegistrationInfo {
    /// `false` when either half of the credential pair is empty, which means
    /// the registration is unusable for heartbeats and outbound traffic.
    pub fn has_credentials(&self) -> bool {
        !self.collector_credential_id.is_empty() && !self.collector_credential_key.is_empty()
    }
}

impl fmt::Debug for RegistrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationInfo")
            .field("collector_id", &self.collector_id)
            .field("collector_credential_id", &self.collector_credential_id)
            .field("collector_credential_key", &"<redacted>")
            .finish()
    }
}

/// What the credential store persists per identity key.
///
/// Serialized flat:
/// `{"collectorName", "collectorId", "collectorCredentialId", "collectorCredentialKey"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorCredentials {
    pub collector_name: String,
    #[serde(flatten)]
    pub credentials: RegistrationInfo,
}

/// `Basic base64(user:secret)` as used by both the registration and the
/// per-request collector authentication.
pub(crate) fn basic_auth_value(user: &str, secret: &str) -> String {
    let token = STANDARD.encode(format!("{user}:{secret}"));
    format!("Basic {token}")
}
