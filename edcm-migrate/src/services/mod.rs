//! Service modules for the target synchronization engine

pub mod edc_client;
pub mod failure_log;
pub mod migration_engine;
pub mod value_normalizer;
pub mod vault_client;

pub use edc_client::{EdcApi, EdcError, SessionToken};
pub use failure_log::{FailureLog, FailureLogPaths};
pub use migration_engine::{migrate, migrate_with, MigrationEngine, MigrationRequest};
pub use value_normalizer::normalize_value;
pub use vault_client::VaultClient;
