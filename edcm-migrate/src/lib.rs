//! edcm-migrate library interface
//!
//! Exposes the synchronization engine for the binary and for integration
//! testing against scripted [`EdcApi`](services::edc_client::EdcApi) fakes.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{MigrationError, MigrationResult};
pub use crate::models::MigrationOutcome;
pub use crate::services::migration_engine::{migrate, migrate_with, MigrationRequest};
