//! Periodic heartbeat keeping the collector registration alive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::{DEFAULT_HEARTBEAT_INTERVAL, HEARTBEAT_URL};
use crate::credentials::RegistrationInfo;
use crate::error::HeartbeatError;
use crate::signal::StopSignal;
use crate::transport::{error_body, AuthenticatedClient};

/// Counters describing the heartbeat loop's activity.
#[derive(Debug, Default)]
pub struct HeartbeatStats {
    sent: AtomicU64,
    failed: AtomicU64,
}

impl HeartbeatStats {
    /// Heartbeats acknowledged with `204 No Content`.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Heartbeats that failed for any reason.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Background loop sending one heartbeat per interval until stopped.
///
/// The loop has two states, running and stopped. It runs from the moment
/// [`run`](Self::run) is polled until `stop` fires; a stop that arrives
/// while waiting for the next tick or while a request is in flight ends the
/// loop at once, dropping the request.
pub struct HeartbeatLoop {
    client: AuthenticatedClient,
    registration: RegistrationInfo,
    interval: Duration,
    stats: Arc<HeartbeatStats>,
}

impl HeartbeatLoop {
    /// A zero `interval` selects [`DEFAULT_HEARTBEAT_INTERVAL`].
    pub fn new(
        client: AuthenticatedClient,
        registration: RegistrationInfo,
        interval: Duration,
        stats: Arc<HeartbeatStats>,
    ) -> Self {
        let interval = if interval.is_zero() {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            interval
        };
        Self {
            client,
            registration,
            interval,
            stats,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(self, stop: StopSignal) {
        if !self.registration.has_credentials() {
            error!("collector not registered, cannot send heartbeat");
            return;
        }

        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "heartbeat API initialized, starting to send heartbeat requests"
        );

        // The first tick completes immediately.
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = stop.fired() => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                biased;
                () = stop.fired() => break,
                result = self.send_heartbeat() => match result {
                    Ok(()) => {
                        self.stats.sent.fetch_add(1, Ordering::Relaxed);
                        debug!("heartbeat sent");
                    }
                    Err(e) => {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, "heartbeat error");
                    }
                },
            }
        }

        info!("heartbeat sender turned off");
    }

    async fn send_heartbeat(&self) -> Result<(), HeartbeatError> {
        let request = self
            .client
            .post(HEARTBEAT_URL)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .build()?;

        let res = self.client.execute(request).await?;
        let status = res.status();
        if status != StatusCode::NO_CONTENT {
            let body = error_body(res).await;
            return Err(HeartbeatError::UnexpectedStatus { status, body });
        }
        Ok(())
    }
}
