//! Error types for catmig-recon
//!
//! Every variant is recoverable at the per-record boundary: the pipeline logs it,
//! counts it, and moves on to the next record. Only resource acquisition in the
//! binary aborts a run.

use thiserror::Error;

/// Reconciliation error type
#[derive(Debug, Error)]
pub enum ReconError {
    /// Network fault or non-success HTTP status from the authority API
    #[error("Transport error: {0}")]
    Transport(String),

    /// Cache store read or write failed
    #[error("Cache error: {0}")]
    Cache(String),

    /// Authority record lacks its own identifier field at substitution time
    #[error("Authority record for {0} has no identifier field")]
    AuthorityIntegrity(String),

    /// Output sink write failed
    #[error("Output error: {0}")]
    Output(String),

    /// Invalid run configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// catmig-common error
    #[error("Common error: {0}")]
    Common(#[from] catmig_common::Error),
}

impl From<sqlx::Error> for ReconError {
    fn from(err: sqlx::Error) -> Self {
        ReconError::Cache(err.to_string())
    }
}

impl From<reqwest::Error> for ReconError {
    fn from(err: reqwest::Error) -> Self {
        ReconError::Transport(err.to_string())
    }
}

/// Result type for reconciliation operations
pub type ReconResult<T> = Result<T, ReconError>;
