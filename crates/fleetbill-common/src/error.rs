//! Error types for FleetBill
//!
//! Provides a unified error type shared by the engine and its collaborators

use thiserror::Error;

/// Result type alias using FleetBillError
pub type Result<T> = std::result::Result<T, FleetBillError>;

/// Unified error type for FleetBill operations
#[derive(Debug, Error)]
pub enum FleetBillError {
    // Caller input errors
    #[error("Validation error: {0}")]
    Validation(String),

    // A whole metric source failed; no partial estimate is produced
    #[error("Upstream unavailable ({source_name}): {reason}")]
    UpstreamUnavailable { source_name: String, reason: String },

    // Inventory errors
    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("No apps deployed")]
    NoApps,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetBillError {
    /// Build an upstream failure for the named source
    pub fn upstream(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        FleetBillError::UpstreamUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Re-attribute any error to a metric source.
    ///
    /// Upstream failures pass through untouched; everything else (parse,
    /// serialization, internal) becomes an upstream failure of `source_name`.
    pub fn into_upstream(self, source_name: &str) -> Self {
        match self {
            err @ FleetBillError::UpstreamUnavailable { .. } => err,
            other => FleetBillError::upstream(source_name, other.to_string()),
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, FleetBillError::UpstreamUnavailable { .. })
    }
}

impl From<serde_json::Error> for FleetBillError {
    fn from(err: serde_json::Error) -> Self {
        FleetBillError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for FleetBillError {
    fn from(err: std::io::Error) -> Self {
        FleetBillError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for FleetBillError {
    fn from(err: anyhow::Error) -> Self {
        FleetBillError::Internal(err.to_string())
    }
}
