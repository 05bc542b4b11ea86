//! Value store contract and SQLite implementation.
//!
//! # Responsibility
//! - Load value rows of one key, by slot, or as a count.
//!
//! # Invariants
//! - `find_by_key` returns an empty list, never an error, for keys without rows.
//! - `find_one` treats more than one row per `(key, pattern, change_set)` as
//!   corruption.

use super::criteria::{self, Attribute, EqualsCriterion, QueryTarget};
use super::{ensure_connection_ready, RepoError, RepoResult};
use crate::model::entity::{PropertyKey, PropertyValue};
use rusqlite::{Connection, Row};

/// Queryable columns of `property_values`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueAttribute {
    Key,
    Pattern,
    ChangeSet,
}

impl Attribute for ValueAttribute {
    fn column(self) -> &'static str {
        match self {
            Self::Key => "key_id",
            Self::Pattern => "pattern",
            Self::ChangeSet => "change_set",
        }
    }
}

impl QueryTarget for PropertyValue {
    type Attribute = ValueAttribute;

    const TABLE: &'static str = "property_values";
    const COLUMNS: &'static str = "key_id, pattern, change_set, payload";
    const ORDER_BY: &'static str = "pattern ASC, change_set ASC";

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        let key_id: String = row.get("key_id")?;
        let pattern = row.get::<_, Option<String>>("pattern")?.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "missing pattern in property_values.pattern for key `{key_id}`"
            ))
        })?;
        let payload = row.get::<_, Option<String>>("payload")?.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "missing payload in property_values.payload for key `{key_id}`"
            ))
        })?;

        Ok(Self {
            key_id,
            pattern,
            change_set: row.get("change_set")?,
            payload,
        })
    }
}

/// Read access to value rows.
pub trait ValueRepository {
    /// Loads every value row of `key`.
    fn find_by_key(&self, key: &PropertyKey) -> RepoResult<Vec<PropertyValue>>;
    /// Loads the row stored in one slot of `key`.
    fn find_one(
        &self,
        key: &PropertyKey,
        pattern: &str,
        change_set: Option<&str>,
    ) -> RepoResult<Option<PropertyValue>>;
    /// Counts value rows of `key`.
    fn count_by_key(&self, key: &PropertyKey) -> RepoResult<u64>;
}

/// SQLite-backed value store.
pub struct SqliteValueRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteValueRepository<'conn> {
    /// Creates the store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ValueRepository for SqliteValueRepository<'_> {
    fn find_by_key(&self, key: &PropertyKey) -> RepoResult<Vec<PropertyValue>> {
        criteria::result_list::<PropertyValue>(
            self.conn,
            &[EqualsCriterion::text(ValueAttribute::Key, &key.id)],
        )
    }

    fn find_one(
        &self,
        key: &PropertyKey,
        pattern: &str,
        change_set: Option<&str>,
    ) -> RepoResult<Option<PropertyValue>> {
        let mut rows = criteria::result_list::<PropertyValue>(
            self.conn,
            &[
                EqualsCriterion::text(ValueAttribute::Key, &key.id),
                EqualsCriterion::text(ValueAttribute::Pattern, pattern),
                EqualsCriterion::nullable_text(ValueAttribute::ChangeSet, change_set),
            ],
        )?;

        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            found => Err(RepoError::InvalidState(format!(
                "{found} rows found for key `{}`, pattern `{pattern}` and change set `{}`",
                key.id,
                change_set.unwrap_or("<none>")
            ))),
        }
    }

    fn count_by_key(&self, key: &PropertyKey) -> RepoResult<u64> {
        criteria::count::<PropertyValue>(
            self.conn,
            &[EqualsCriterion::text(ValueAttribute::Key, &key.id)],
        )
    }
}
