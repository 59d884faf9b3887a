//! Error types.
//!
//! Each concern has its own enum so callers can tell a broken registration
//! apart from a flaky disk or a failed heartbeat. [`ExtensionError`] is what
//! the lifecycle methods hand back to the host.

use std::path::PathBuf;

use reqwest::header::InvalidHeaderValue;
use reqwest::StatusCode;

use crate::identity::IdentityKey;

/// Errors returned by [`CollectorExtension`](crate::CollectorExtension)
/// construction, start and shutdown.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// Invalid or missing configuration (e.g. empty access id/key).
    #[error("configuration error: {0}")]
    Config(String),

    /// The local hostname could not be determined.
    #[error("cannot get hostname: {0}")]
    Hostname(#[source] std::io::Error),

    /// Registration with the control plane failed.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Reading stored credentials failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The host-provided HTTP client could not be built.
    #[error("couldn't create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// The collector credentials cannot be encoded as a header.
    #[error("couldn't create HTTP client transport: {0}")]
    Transport(#[from] InvalidHeaderValue),

    /// The caller's context fired before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
}

/// Failure of the one-shot registration call.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("cannot get hostname: {0}")]
    Hostname(#[source] std::io::Error),

    /// Transport-level failure (DNS, TLS, connection reset, ...).
    #[error("failed to register the collector: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered outside of the `[200, 400)` range.
    #[error("failed to register the collector, got HTTP status code: {status}")]
    Status { status: StatusCode, body: String },

    /// The API answered successfully but the body is not a registration
    /// payload.
    #[error("malformed registration response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Credential store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the key. Callers normally test with
    /// [`check`](crate::CredentialsStore::check) first.
    #[error("no stored collector credentials for key {0}")]
    NotFound(IdentityKey),

    #[error("credentials store I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed credentials record at {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A single failed heartbeat. Never fatal; the loop logs it and carries on.
#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("unable to send heartbeat request: {0}")]
    Http(#[from] reqwest::Error),

    #[error("collector heartbeat request failed, status code: {status}, body: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
}
