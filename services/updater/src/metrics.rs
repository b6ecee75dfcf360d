//! Connection metrics and the drain monitor.
//!
//! Streaming-edge instances expose a status endpoint behind HTTP digest
//! authentication. The drain monitor polls it at a fixed interval until the
//! instance reports zero live connections; transient fetch or parse errors
//! are logged and treated as "not yet drained", with no circuit breaker and
//! no maximum wait.

use std::time::Duration;

use async_trait::async_trait;
use diqwest::WithDigestAuth;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::UpdateError;

/// Metrics fetch errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// The digest-authenticated request could not be completed.
    #[error("metrics request failed: {0}")]
    Request(#[from] diqwest::error::Error),

    /// The endpoint could not be reached or the body could not be decoded.
    #[error("metrics transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("metrics endpoint rejected request: {status}")]
    Api { status: u16 },
}

/// Connection counters reported by an instance's status endpoint.
///
/// Field names match the wire format, misspelling included; unrecognized
/// fields are ignored.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    #[serde(default)]
    pub max_connections: i32,

    #[serde(default)]
    pub current_connections: i32,

    #[serde(default)]
    pub max_incomming_streams: i32,
}

/// Source of per-instance connection statistics.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ConnectionStats, MetricsError>;
}

/// HTTP digest-authenticated stats client.
pub struct DigestStatsClient {
    client: reqwest::Client,
    username: String,
    password: String,
}

impl DigestStatsClient {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            username: username.into(),
            password: password.into(),
        })
    }
}

#[async_trait]
impl StatsSource for DigestStatsClient {
    async fn fetch(&self, url: &str) -> Result<ConnectionStats, MetricsError> {
        let response = self
            .client
            .get(url)
            .send_with_digest_auth(&self.username, &self.password)
            .await?;

        if !response.status().is_success() {
            return Err(MetricsError::Api {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

/// Polls an instance's status endpoint until its connections drain to zero.
pub struct DrainMonitor<S: StatsSource + ?Sized> {
    stats: std::sync::Arc<S>,
    poll_interval: Duration,
}

impl<S: StatsSource + ?Sized> DrainMonitor<S> {
    pub fn new(stats: std::sync::Arc<S>, poll_interval: Duration) -> Self {
        Self {
            stats,
            poll_interval,
        }
    }

    /// Block until the endpoint reports zero current connections.
    ///
    /// Transient errors are retried indefinitely at the poll interval; the
    /// only other way out is the shutdown signal.
    pub async fn wait_for_drain(
        &self,
        url: &str,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), UpdateError> {
        loop {
            match self.stats.fetch(url).await {
                Ok(stats) if stats.current_connections == 0 => {
                    info!(url = %url, "Instance drained, no connections left");
                    return Ok(());
                }
                Ok(stats) => {
                    info!(
                        url = %url,
                        connections = stats.current_connections,
                        "Connections left, waiting for drain"
                    );
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Unable to retrieve metrics, not drained yet");
                }
            }

            debug!(interval_ms = self.poll_interval.as_millis() as u64, "Drain poll sleeping");
            crate::sleep_or_shutdown(self.poll_interval, shutdown).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_decode_ignores_unknown_fields() {
        let body = r#"{
            "version": "12345678910",
            "maxConnections": 12,
            "currentConnections": 45,
            "maxIncommingStreams": 2,
            "vendorFieldInvented": "INVENTION"
        }"#;

        let stats: ConnectionStats = serde_json::from_str(body).unwrap();
        assert_eq!(stats.max_connections, 12);
        assert_eq!(stats.current_connections, 45);
        assert_eq!(stats.max_incomming_streams, 2);
    }

    #[test]
    fn test_stats_decode_rejects_malformed_json() {
        assert!(serde_json::from_str::<ConnectionStats>("{not json").is_err());
    }
}
