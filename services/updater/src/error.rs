//! Updater error taxonomy.
//!
//! Collaborator errors propagate unchanged (wrapped transparently); the
//! variants here cover the coordination failures the updater itself detects.

use streamroll_catalog::CatalogError;
use streamroll_scheduler::SchedulerError;
use thiserror::Error;

use crate::metrics::MetricsError;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// A bounded wait was exhausted for one specific unit.
    #[error("timed out waiting for unit {0}")]
    Timeout(String),

    /// A batch operation with one or more member failures.
    #[error("{} unit operation(s) failed", .0.len())]
    Aggregate(Vec<UpdateError>),

    /// No instance remains to update: every instance already carries the
    /// target image tag. This is the convergence signal, not a fault.
    #[error("no candidate instance left to update")]
    NoCandidate,

    /// Creating a unit in the scheduler registry failed.
    #[error("failed creating unit {name}: {source}")]
    Creation {
        name: String,
        #[source]
        source: SchedulerError,
    },

    /// A unit file could not be read or resolved.
    #[error("failed resolving unit file {path}: {reason}")]
    UnitFile { path: String, reason: String },

    /// Shutdown was requested while an operation was in flight.
    #[error("shutdown requested")]
    Cancelled,

    /// A fanned-out polling task failed to join.
    #[error("background task failed: {0}")]
    Join(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
