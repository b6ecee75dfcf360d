//! streamroll updater library.
//!
//! Performs zero-downtime rolling replacement of streaming-edge service
//! instances: one catalog instance at a time is claimed with a tag, drained
//! of its live connections, then its backing scheduler unit is destroyed and
//! recreated from an updated definition.
//!
//! ## Architecture
//!
//! - **DrainMonitor**: polls an instance's metrics endpoint until its
//!   connection count reaches zero
//! - **UnitLifecycleOrchestrator**: unit creation guard, idempotent state
//!   transitions, concurrent state-confirmation waiters, machine cache
//! - **RollingUpdateController**: the six-phase per-cycle driver composing
//!   the above, looping until every instance carries the target image tag

use std::time::Duration;

use tokio::sync::watch;

pub mod config;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod machines;
pub mod metrics;

pub use config::{render_status_url, UpdateConfig};
pub use controller::RollingUpdateController;
pub use error::UpdateError;
pub use lifecycle::{CreationDecision, ScheduledCommand, UnitLifecycleOrchestrator};
pub use machines::MachineCache;
pub use metrics::{ConnectionStats, DigestStatsClient, DrainMonitor, StatsSource};

/// Resolves once the shutdown signal is raised (or the sender is gone).
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            // Sender dropped: treat as shutdown rather than spinning.
            return;
        }
    }
}

/// Sleep for `duration` unless shutdown is requested first.
pub(crate) async fn sleep_or_shutdown(
    duration: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), UpdateError> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = shutdown_requested(shutdown) => Err(UpdateError::Cancelled),
    }
}
