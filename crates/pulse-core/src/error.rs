//! Error taxonomy for the Pulse engine.
//!
//! Every fallible operation in the workspace returns [`Result`]. The variants
//! map one-to-one onto the propagation policy:
//! - `Validation` and `InvalidTransition` are returned synchronously to the
//!   caller (ingestion and status mutation).
//! - `InsufficientData` is internal; component boundaries translate it into
//!   "no anomaly / no pattern" rather than a failure.
//! - `DependencyTimeout` flags a degraded external call (embedding provider)
//!   without failing the batch.
//! - `Consistency` triggers a forced recomputation and a warning, not an
//!   abort.

use thiserror::Error;

/// Convenience alias used across all Pulse crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Engine-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input rejected at ingestion or configuration time.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Too few history points to evaluate. Not a caller-visible failure.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// An external synchronous dependency did not answer in time.
    #[error("dependency timed out: {0}")]
    DependencyTimeout(String),

    /// Illegal status change requested on an anomaly or recommendation.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Cached derived data disagrees with its source beyond tolerance.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Storage layer failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid engine configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an insufficient-data error.
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    /// Create a dependency-timeout error.
    pub fn dependency_timeout(msg: impl Into<String>) -> Self {
        Self::DependencyTimeout(msg.into())
    }

    /// Create an invalid-transition error.
    pub fn invalid_transition(
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a consistency-violation error.
    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::Consistency(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for the variants that a scheduled sweep must contain per metric
    /// instead of propagating.
    pub fn is_sweep_containable(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}
