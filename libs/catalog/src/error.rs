//! Catalog errors.

use thiserror::Error;

/// Errors produced by the catalog model and registry client.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A tag failed validation (empty part, or a part containing `=`).
    #[error("invalid tag: {0}")]
    InvalidTag(String),

    /// No instance matched the selection predicate.
    #[error("no instance found: {0}")]
    NotFound(String),

    /// The registry rejected a request.
    #[error("registry rejected request: {status} - {body}")]
    Api { status: u16, body: String },

    /// The registry could not be reached.
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
