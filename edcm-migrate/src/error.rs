//! Error types for edcm-migrate
//!
//! Only session-level failures surface here. Per-item and per-event
//! failures never abort a run; they go to the failure logs instead.

use crate::services::edc_client::EdcError;
use thiserror::Error;

/// Fatal migration error
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Credential or transport failure while authenticating
    #[error("Authentication failed: {0}")]
    Authentication(#[source] EdcError),

    /// The session token stopped being accepted partway through the run
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// HTTP client could not be constructed
    #[error("Client setup failed: {0}")]
    Client(#[source] EdcError),

    /// Failure logs could not be written
    #[error("Failure log write failed: {0}")]
    LogWrite(#[from] std::io::Error),
}

/// Result type for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;
