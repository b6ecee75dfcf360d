//! Scheduler errors.

use thiserror::Error;

/// Errors produced by the scheduler model and client.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The named unit does not exist in the scheduler registry.
    #[error("unit not found: {0}")]
    NotFound(String),

    /// A unit name or option set failed scheduler-imposed constraints.
    #[error("invalid unit {name}: {reason}")]
    InvalidUnit { name: String, reason: String },

    /// The scheduler rejected a request.
    #[error("scheduler rejected request: {status} - {body}")]
    Api { status: u16, body: String },

    /// The scheduler could not be reached.
    #[error("scheduler request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
