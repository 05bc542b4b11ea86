//! Reconciliation between in-memory key values and persisted rows.
//!
//! # Responsibility
//! - Load keys into [`KeyValues`] containers, one by one, all at once, or as
//!   a refresh of a previously loaded map.
//! - Store and remove values while keeping key rows in step with their values.
//!
//! # Invariants
//! - A key row exists iff at least one value row references it: the first
//!   stored value creates it, removing the last value deletes it in the same
//!   transaction.
//! - Every mutating call opens exactly one [`WriteScope`] and closes it on
//!   every exit path.
//! - Input validation runs before any row is staged.
//! - A missing key is `Ok(None)` or a no-op, never an error.

use crate::config::{ConfigError, StoreConfig};
use crate::model::entity::{PropertyKey, PropertyValue};
use crate::model::key_values::{DomainSpecificValue, KeyValues, KeyValuesFactory};
use crate::model::pattern::PatternCodec;
use crate::repo::key_repo::{KeyRepository, SqliteKeyRepository};
use crate::repo::transaction::{SqliteTransactionManager, TransactionManager};
use crate::repo::value_repo::{SqliteValueRepository, ValueRepository};
use crate::repo::RepoError;
use log::{debug, info};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Error surfaced by reconciliation operations.
#[derive(Debug)]
pub enum PersistenceError {
    /// Caller-supplied model is missing required data.
    InvalidInput(String),
    /// Persisted rows violate the key/value invariants or cannot be decoded.
    InvalidState(String),
    /// Store configuration rejected while wiring the service.
    InvalidConfig(ConfigError),
    /// Store-boundary failure, propagated unchanged.
    Repo(RepoError),
}

impl Display for PersistenceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::InvalidConfig(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PersistenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfig(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::InvalidInput(_) | Self::InvalidState(_) => None,
        }
    }
}

impl From<RepoError> for PersistenceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::InvalidState(message) | RepoError::InvalidData(message) => {
                Self::InvalidState(message)
            }
            other => Self::Repo(other),
        }
    }
}

/// Reconciliation service over a key store, a value store and a
/// transaction boundary.
pub struct PersistenceService<K, V, T> {
    keys: K,
    values: V,
    transactions: T,
    codec: PatternCodec,
}

/// Service wired to one SQLite connection.
pub type SqlitePersistenceService<'conn> = PersistenceService<
    SqliteKeyRepository<'conn>,
    SqliteValueRepository<'conn>,
    SqliteTransactionManager<'conn>,
>;

impl<'conn> SqlitePersistenceService<'conn> {
    /// Wires all stores to a migrated connection.
    pub fn try_new(conn: &'conn Connection, config: &StoreConfig) -> PersistenceResult<Self> {
        config.validate().map_err(PersistenceError::InvalidConfig)?;
        let service = PersistenceService::new(
            SqliteKeyRepository::try_new(conn)?,
            SqliteValueRepository::try_new(conn)?,
            SqliteTransactionManager::new(conn),
        );
        Ok(service.with_codec(PatternCodec::new(config.pattern_delimiter)))
    }
}

impl<K, V, T> PersistenceService<K, V, T>
where
    K: KeyRepository,
    V: ValueRepository,
    T: TransactionManager,
{
    pub fn new(keys: K, values: V, transactions: T) -> Self {
        Self {
            keys,
            values,
            transactions,
            codec: PatternCodec::default(),
        }
    }

    /// Replaces the codec used to split stored patterns.
    pub fn with_codec(mut self, codec: PatternCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn codec(&self) -> PatternCodec {
        self.codec
    }

    /// Factory producing containers that share this service's codec.
    pub fn key_values_factory<P>(&self) -> impl Fn() -> KeyValues<P> {
        let codec = self.codec;
        move || KeyValues::with_codec(codec)
    }

    /// Loads one key.
    ///
    /// # Errors
    /// - `InvalidState` when the key has no value rows or a row cannot be
    ///   decoded.
    pub fn load<P, F>(&self, id: &str, factory: &F) -> PersistenceResult<Option<KeyValues<P>>>
    where
        P: DeserializeOwned,
        F: KeyValuesFactory<P> + ?Sized,
    {
        let Some(key) = self.keys.find_by_id(id)? else {
            debug!("event=load module=service status=noop key={id} reason=key_not_found");
            return Ok(None);
        };

        let key_values = self.build_key_values(&key, factory)?;
        debug!(
            "event=load module=service status=ok key={} values={}",
            id,
            key_values.len()
        );
        Ok(Some(key_values))
    }

    /// Loads every key. Fails as a whole if any key is inconsistent.
    pub fn load_all<P, F>(&self, factory: &F) -> PersistenceResult<BTreeMap<String, KeyValues<P>>>
    where
        P: DeserializeOwned,
        F: KeyValuesFactory<P> + ?Sized,
    {
        let started_at = Instant::now();
        let mut loaded = BTreeMap::new();
        for key in self.keys.find_all()? {
            let key_values = self.build_key_values(&key, factory)?;
            loaded.insert(key.id, key_values);
        }

        info!(
            "event=load_all module=service status=ok keys={} duration_ms={}",
            loaded.len(),
            started_at.elapsed().as_millis()
        );
        Ok(loaded)
    }

    /// Rebuilds every entry of `existing` from current rows.
    ///
    /// Keys deleted in the meantime are dropped from the result. Surviving
    /// entries are replaced, never merged with the stale container.
    pub fn reload<P, F>(
        &self,
        existing: &BTreeMap<String, KeyValues<P>>,
        factory: &F,
    ) -> PersistenceResult<BTreeMap<String, KeyValues<P>>>
    where
        P: DeserializeOwned,
        F: KeyValuesFactory<P> + ?Sized,
    {
        let mut reloaded = BTreeMap::new();
        for id in existing.keys() {
            match self.keys.find_by_id(id)? {
                Some(key) => {
                    let key_values = self.build_key_values(&key, factory)?;
                    reloaded.insert(key.id, key_values);
                }
                None => {
                    debug!("event=reload module=service status=dropped key={id}");
                }
            }
        }

        info!(
            "event=reload module=service status=ok requested={} reloaded={}",
            existing.len(),
            reloaded.len()
        );
        Ok(reloaded)
    }

    /// Persists the values of `key_values` belonging to `change_set`.
    ///
    /// Creates the key row (with the container's description) when absent.
    /// Rows are always inserted; replacing a slot requires removing it first.
    ///
    /// # Errors
    /// - `InvalidInput` for an empty id, an empty container, or a selected
    ///   value whose payload is missing or does not survive a JSON round trip
    ///   (e.g. `f64::NAN`, which serializes as `null`).
    /// - `Repo` when the store rejects a row (e.g. an occupied slot).
    pub fn store<P: Serialize + DeserializeOwned>(
        &self,
        id: &str,
        key_values: &KeyValues<P>,
        change_set: Option<&str>,
    ) -> PersistenceResult<()> {
        let started_at = Instant::now();
        if id.trim().is_empty() {
            return Err(PersistenceError::InvalidInput(
                "key id must not be empty".to_string(),
            ));
        }
        if key_values.is_empty() {
            return Err(PersistenceError::InvalidInput(format!(
                "key `{id}` has no domain specific values to store"
            )));
        }

        let rows = key_values
            .values_for_change_set(change_set)
            .map(|value| to_row(id, value, change_set))
            .collect::<PersistenceResult<Vec<_>>>()?;

        let mut scope = self.transactions.begin()?;
        if rows.is_empty() {
            scope.end()?;
            debug!(
                "event=store module=service status=noop key={} change_set={} reason=no_values_in_change_set",
                id,
                change_set.unwrap_or("-")
            );
            return Ok(());
        }

        let creates_key = self.keys.find_by_id(id)?.is_none();
        if creates_key {
            scope.stage_insert(PropertyKey::new(
                id,
                key_values.description().map(str::to_string),
            ));
        }
        let stored = rows.len();
        for row in rows {
            scope.stage_insert(row);
        }
        scope.end()?;

        info!(
            "event=store module=service status=ok key={} change_set={} values={} created_key={} duration_ms={}",
            id,
            change_set.unwrap_or("-"),
            stored,
            creates_key,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Deletes every persisted row of `id` matching a value of
    /// `values_to_remove`, and the key row once no value is left.
    ///
    /// Rows match on pattern and change-set of each value; `change_set` only
    /// labels the request in logs.
    ///
    /// # Errors
    /// - `InvalidState` when the key exists without rows, or when
    ///   `values_to_remove` is empty for an existing key.
    pub fn remove_matching<P>(
        &self,
        id: &str,
        values_to_remove: &KeyValues<P>,
        change_set: Option<&str>,
    ) -> PersistenceResult<()> {
        let started_at = Instant::now();
        let Some(key) = self.keys.find_by_id(id)? else {
            self.transactions.begin()?.end()?;
            debug!("event=remove module=service status=noop key={id} reason=key_not_found");
            return Ok(());
        };

        let rows = self.values.find_by_key(&key)?;
        if rows.is_empty() {
            return Err(PersistenceError::InvalidState(format!(
                "key `{id}` exists without values"
            )));
        }
        if values_to_remove.is_empty() {
            return Err(PersistenceError::InvalidState(format!(
                "removal request for key `{id}` names no values"
            )));
        }

        let mut scope = self.transactions.begin()?;
        let mut removed = 0_usize;
        let mut retained = 0_usize;
        for row in rows {
            if values_to_remove
                .domain_specific_values()
                .any(|value| row.matches(value))
            {
                scope.stage_delete(row);
                removed += 1;
            } else {
                retained += 1;
            }
        }
        let removes_key = retained == 0;
        if removes_key {
            scope.stage_delete(key);
        }
        scope.end()?;

        info!(
            "event=remove module=service status=ok key={} change_set={} removed={} retained={} removed_key={} duration_ms={}",
            id,
            change_set.unwrap_or("-"),
            removed,
            retained,
            removes_key,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Deletes the row stored for `value`'s pattern in `change_set`, and the
    /// key row when that row was its last value.
    ///
    /// # Errors
    /// - `InvalidInput` when `value` carries no payload.
    /// - `InvalidState` when the slot holds more than one row.
    pub fn remove_single<P>(
        &self,
        id: &str,
        value: &DomainSpecificValue<P>,
        change_set: Option<&str>,
    ) -> PersistenceResult<()> {
        let started_at = Instant::now();
        let Some(key) = self.keys.find_by_id(id)? else {
            self.transactions.begin()?.end()?;
            debug!("event=remove_single module=service status=noop key={id} reason=key_not_found");
            return Ok(());
        };

        if value.value.is_none() {
            return Err(PersistenceError::InvalidInput(format!(
                "value for key `{id}` and pattern `{}` has no payload",
                value.pattern
            )));
        }

        let Some(row) = self.values.find_one(&key, &value.pattern, change_set)? else {
            self.transactions.begin()?.end()?;
            debug!(
                "event=remove_single module=service status=noop key={} reason=value_not_found",
                id
            );
            return Ok(());
        };

        let remaining = self.values.count_by_key(&key)?;
        let mut scope = self.transactions.begin()?;
        scope.stage_delete(row);
        let removes_key = remaining == 1;
        if removes_key {
            scope.stage_delete(key);
        }
        scope.end()?;

        info!(
            "event=remove_single module=service status=ok key={} change_set={} removed_key={} duration_ms={}",
            id,
            change_set.unwrap_or("-"),
            removes_key,
            started_at.elapsed().as_millis()
        );
        Ok(())
    }

    /// Identifiers of all keys, in key store order.
    pub fn list_keys(&self) -> PersistenceResult<Vec<String>> {
        let keys = self.keys.find_all()?;
        Ok(keys.into_iter().map(|key| key.id).collect())
    }

    fn build_key_values<P, F>(&self, key: &PropertyKey, factory: &F) -> PersistenceResult<KeyValues<P>>
    where
        P: DeserializeOwned,
        F: KeyValuesFactory<P> + ?Sized,
    {
        let rows = self.values.find_by_key(key)?;
        if rows.is_empty() {
            return Err(PersistenceError::InvalidState(format!(
                "key `{}` exists without values",
                key.id
            )));
        }

        let mut key_values = factory.create();
        for row in rows {
            if row.key_id != key.id {
                return Err(PersistenceError::InvalidState(format!(
                    "value row of key `{}` returned while loading key `{}`",
                    row.key_id, key.id
                )));
            }
            let payload: P = serde_json::from_str(&row.payload).map_err(|err| {
                PersistenceError::InvalidState(format!(
                    "undecodable payload for key `{}` and pattern `{}`: {err}",
                    key.id, row.pattern
                ))
            })?;
            let parts = self.codec.split(&row.pattern);
            key_values
                .put_with_change_set(row.change_set.as_deref(), payload, &parts)
                .map_err(|err| PersistenceError::InvalidState(err.to_string()))?;
        }
        key_values.set_description(key.description.clone());
        Ok(key_values)
    }
}

fn to_row<P: Serialize + DeserializeOwned>(
    id: &str,
    value: &DomainSpecificValue<P>,
    change_set: Option<&str>,
) -> PersistenceResult<PropertyValue> {
    let payload = value.value.as_ref().ok_or_else(|| {
        PersistenceError::InvalidInput(format!(
            "value for key `{id}` and pattern `{}` has no payload",
            value.pattern
        ))
    })?;
    let payload = serde_json::to_string(payload).map_err(|err| {
        PersistenceError::InvalidInput(format!(
            "value for key `{id}` and pattern `{}` is not serializable: {err}",
            value.pattern
        ))
    })?;

    serde_json::from_str::<P>(&payload).map_err(|err| {
        PersistenceError::InvalidInput(format!(
            "value for key `{id}` and pattern `{}` does not read back from its JSON form: {err}",
            value.pattern
        ))
    })?;

    Ok(PropertyValue {
        key_id: id.to_string(),
        pattern: value.pattern.clone(),
        change_set: change_set.map(str::to_string),
        payload,
    })
}
