//! Collector extension lifecycle.
//!
//! [`CollectorExtension`] decides on start whether to register or reuse
//! stored credentials, installs collector authentication on its HTTP
//! client and keeps the registration alive with a background
//! [`HeartbeatLoop`]. The host drives it through the [`Extension`] trait.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::ExtensionConfig;
use crate::credentials::{CollectorCredentials, RegistrationInfo};
use crate::error::ExtensionError;
use crate::heartbeat::{HeartbeatLoop, HeartbeatStats};
use crate::identity::{derive_key, IdentityKey};
use crate::registration::{local_hostname, RegistrationClient, RegistrationMetadata};
use crate::signal::StopSignal;
use crate::store::CredentialsStore;
use crate::transport::{AuthenticatedClient, AuthenticatingTransport, RequestSender};

// ---------------------------------------------------------------------------
// Host contract
// ---------------------------------------------------------------------------

/// Resources the hosting process shares with its extensions.
pub trait Host: Send + Sync {
    /// Base construction of outbound HTTP clients. Hosts override this to
    /// apply their own timeouts, proxies, TLS roots or default headers; the
    /// extension installs collector authentication on top.
    fn http_client_builder(&self) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
    }
}

/// A host with no customisation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHost;

impl Host for DefaultHost {}

/// Lifecycle hooks the host calls once each.
///
/// `ctx` is the caller's cancellation: when it fires the pending operation
/// returns [`ExtensionError::Cancelled`].
pub trait Extension {
    fn start(
        &mut self,
        ctx: &StopSignal,
        host: &dyn Host,
    ) -> impl Future<Output = Result<(), ExtensionError>> + Send;

    fn shutdown(&self, ctx: &StopSignal) -> impl Future<Output = Result<(), ExtensionError>> + Send;
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

/// Registered identity established by [`Extension::start`].
#[derive(Debug, Clone)]
struct CollectorIdentity {
    registration: RegistrationInfo,
    client: AuthenticatedClient,
}

pub struct CollectorExtension {
    config: ExtensionConfig,
    collector_name: String,
    base_url: String,
    hash_key: IdentityKey,
    store: Arc<dyn CredentialsStore>,
    identity: Option<CollectorIdentity>,
    stop: StopSignal,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<HeartbeatStats>,
}

impl CollectorExtension {
    /// Validate the configuration and settle on a collector name.
    ///
    /// When no name is configured and nothing is stored for this
    /// configuration yet, a `<hostname>-<uuid>` name is generated. When
    /// something is stored the name is taken from the record on start.
    pub fn new(config: ExtensionConfig, store: Arc<dyn CredentialsStore>) -> Result<Self, ExtensionError> {
        if !config.credentials.is_complete() {
            return Err(ExtensionError::Config(
                "access_key and/or access_id not provided".into(),
            ));
        }

        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ExtensionError::Config(format!("invalid API base URL {base_url:?}: {e}")))?;

        let hash_key = derive_key(
            &config.collector_name,
            &config.credentials.access_id,
            &config.credentials.access_key,
        );

        let collector_name = if !config.collector_name.is_empty() {
            config.collector_name.clone()
        } else if store.check(&hash_key) {
            String::new()
        } else {
            let hostname = local_hostname().map_err(ExtensionError::Hostname)?;
            format!("{hostname}-{}", Uuid::new_v4())
        };

        Ok(Self {
            config,
            collector_name,
            base_url,
            hash_key,
            store,
            identity: None,
            stop: StopSignal::new(),
            heartbeat: Mutex::new(None),
            stats: Arc::new(HeartbeatStats::default()),
        })
    }

    pub fn component_id(&self) -> &str {
        &self.config.extension_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collector_name(&self) -> &str {
        &self.collector_name
    }

    /// Empty until the extension has started.
    pub fn collector_id(&self) -> &str {
        self.identity
            .as_ref()
            .map_or("", |identity| identity.registration.collector_id.as_str())
    }

    /// Client for the control-plane API with collector authentication
    /// installed, available once started.
    pub fn http_client(&self) -> Option<&AuthenticatedClient> {
        self.identity.as_ref().map(|identity| &identity.client)
    }

    pub fn heartbeat_stats(&self) -> Arc<HeartbeatStats> {
        Arc::clone(&self.stats)
    }

    /// Wrap `inner` so its requests carry this collector's credentials.
    ///
    /// Lets unrelated exporters attach the collector identity to their own
    /// traffic.
    pub fn round_tripper<S: RequestSender>(&self, inner: S) -> Result<AuthenticatingTransport<S>, ExtensionError> {
        let identity = self
            .identity
            .as_ref()
            .ok_or_else(|| ExtensionError::Config("collector is not registered yet".into()))?;
        Ok(AuthenticatingTransport::new(
            &identity.registration.collector_credential_id,
            &identity.registration.collector_credential_key,
            inner,
        )?)
    }

    /// Register or reuse stored credentials, per the clobber policy.
    async fn establish_credentials(&mut self, ctx: &StopSignal) -> Result<CollectorCredentials, ExtensionError> {
        if self.store.check(&self.hash_key) {
            let stored = self.store.get(&self.hash_key)?;
            self.collector_name = stored.collector_name.clone();

            if !self.config.clobber {
                info!("found stored credentials, skipping registration");
                return Ok(stored);
            }
            info!("locally stored credentials found, but clobber flag is set: re-registering the collector");
        } else {
            info!("locally stored credentials not found, registering the collector");
        }

        let credentials = self.register(ctx).await?;
        // The credentials stay valid for this process even if they cannot
        // be persisted; the next start registers again.
        if let Err(e) = self.store.store(&self.hash_key, &credentials) {
            error!(error = %e, "unable to store collector credentials");
        }
        Ok(credentials)
    }

    async fn register(&self, ctx: &StopSignal) -> Result<CollectorCredentials, ExtensionError> {
        let client = RegistrationClient::new(self.base_url.clone(), self.config.credentials.clone());
        let metadata = RegistrationMetadata::from_config(&self.config);

        tokio::select! {
            biased;
            () = ctx.fired() => Err(ExtensionError::Cancelled),
            result = client.register(&self.collector_name, &metadata) => Ok(result?),
        }
    }
}

impl Extension for CollectorExtension {
    /// Establish the collector identity and launch the heartbeat loop.
    ///
    /// Registration (if any) completes before the authenticated client is
    /// built, which completes before the heartbeat loop is spawned. Returns
    /// without waiting for the first heartbeat.
    async fn start(&mut self, ctx: &StopSignal, host: &dyn Host) -> Result<(), ExtensionError> {
        if self.identity.is_some() {
            return Err(ExtensionError::Config("extension already started".into()));
        }

        let credentials = self.establish_credentials(ctx).await?;
        let registration = credentials.credentials;

        let http = host
            .http_client_builder()
            .build()
            .map_err(ExtensionError::HttpClient)?;
        let transport = AuthenticatingTransport::new(
            &registration.collector_credential_id,
            &registration.collector_credential_key,
            http,
        )?;
        let client = AuthenticatedClient::new(self.base_url.clone(), transport);

        info!(
            collector_name = %self.collector_name,
            collector_id = %registration.collector_id,
            "collector identity established"
        );

        let heartbeat = HeartbeatLoop::new(
            client.clone(),
            registration.clone(),
            self.config.heartbeat_interval(),
            Arc::clone(&self.stats),
        );
        let span = info_span!("heartbeat", collector_name = %self.collector_name);
        let handle = tokio::spawn(heartbeat.run(self.stop.clone()).instrument(span));

        *self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        self.identity = Some(CollectorIdentity { registration, client });
        Ok(())
    }

    /// Stop the heartbeat loop and wait for it to finish.
    ///
    /// Safe to call any number of times, concurrently or not; the loop is
    /// signalled once.
    async fn shutdown(&self, ctx: &StopSignal) -> Result<(), ExtensionError> {
        if self.stop.fire() {
            info!("stopping heartbeat loop");
        }

        let handle = self
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match handle {
            Some(handle) => tokio::select! {
                biased;
                () = ctx.fired() => Err(ExtensionError::Cancelled),
                joined = handle => {
                    if let Err(e) = joined {
                        warn!(error = %e, "heartbeat task ended abnormally");
                    }
                    Ok(())
                }
            },
            None if ctx.is_fired() => Err(ExtensionError::Cancelled),
            None => Ok(()),
        }
    }
}

/// A started extension dropped without [`Extension::shutdown`] still stops
/// its heartbeat loop; the task ends on its own without being awaited.
impl Drop for CollectorExtension {
    fn drop(&mut self) {
        if self.stop.fire() {
            debug!("collector extension dropped, stopping heartbeat loop");
        }
    }
}
