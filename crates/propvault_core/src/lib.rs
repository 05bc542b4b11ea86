//! Core domain logic for the property vault.
//! This crate owns the key/value existence invariants and their storage.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, LoggingConfig, StoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::entity::{Entity, PropertyKey, PropertyValue};
pub use model::key_values::{DomainSpecificValue, KeyValues, KeyValuesError, KeyValuesFactory};
pub use model::pattern::{PatternCodec, ValueSlot};
pub use repo::key_repo::{KeyRepository, SqliteKeyRepository};
pub use repo::transaction::{SqliteTransactionManager, StagedChange, TransactionManager, WriteScope};
pub use repo::value_repo::{SqliteValueRepository, ValueRepository};
pub use repo::{RepoError, RepoResult};
pub use service::persistence_service::{
    PersistenceError, PersistenceResult, PersistenceService, SqlitePersistenceService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
