//! # Collector identity
//!
//! Registers a collector with the control-plane API, persists the
//! credentials it receives, reuses them across restarts, keeps the
//! registration alive with heartbeats and authenticates outbound requests
//! with the collector's own credentials.
//!
//! The crate provides:
//!
//! * [`CollectorExtension`] — the lifecycle orchestrator driven by a host
//!   through the [`Extension`] trait.
//! * [`CredentialsStore`] — keyed persistence, with
//!   [`LocalFsCredentialsStore`] and [`MemoryCredentialsStore`] backends.
//! * [`RegistrationClient`] — the one-shot registration call.
//! * [`AuthenticatingTransport`] — a [`RequestSender`] decorator adding
//!   collector Basic credentials to every request.
//! * [`HeartbeatLoop`] — the cancellable background heartbeat.
//! * [`StopSignal`] — fire-once cancellation shared by all of the above.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use collector_identity::{
//!     AccessCredentials, CollectorExtension, DefaultHost, Extension, ExtensionConfig,
//!     LocalFsCredentialsStore, StopSignal,
//! };
//!
//! # async fn run() -> Result<(), collector_identity::ExtensionError> {
//! let config = ExtensionConfig {
//!     credentials: AccessCredentials::new("access-id", "access-key"),
//!     ..ExtensionConfig::default()
//! };
//! let store = Arc::new(LocalFsCredentialsStore::new(config.credentials_directory()));
//! let mut extension = CollectorExtension::new(config, store)?;
//!
//! extension.start(&StopSignal::new(), &DefaultHost).await?;
//! println!("registered as {}", extension.collector_id());
//!
//! extension.shutdown(&StopSignal::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod extension;
pub mod heartbeat;
pub mod identity;
pub mod registration;
pub mod signal;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::ExtensionConfig;
pub use credentials::{AccessCredentials, CollectorCredentials, RegistrationInfo};
pub use error::{ExtensionError, HeartbeatError, RegistrationError, StoreError};
pub use extension::{CollectorExtension, DefaultHost, Extension, Host};
pub use heartbeat::{HeartbeatLoop, HeartbeatStats};
pub use identity::{derive_key, IdentityKey};
pub use registration::{RegistrationClient, RegistrationMetadata};
pub use signal::StopSignal;
pub use store::{CredentialsStore, LocalFsCredentialsStore, MemoryCredentialsStore};
pub use transport::{AuthenticatedClient, AuthenticatingTransport, RequestSender};
