//! Key store contract and SQLite implementation.
//!
//! # Invariants
//! - `id` is the primary key, so `find_by_id` yields at most one row.
//! - `find_all` yields keys in ascending id order.

use super::criteria::{self, Attribute, EqualsCriterion, QueryTarget};
use super::{ensure_connection_ready, RepoResult};
use crate::model::entity::PropertyKey;
use rusqlite::{Connection, Row};

/// Queryable columns of `property_keys`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAttribute {
    Id,
}

impl Attribute for KeyAttribute {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
        }
    }
}

impl QueryTarget for PropertyKey {
    type Attribute = KeyAttribute;

    const TABLE: &'static str = "property_keys";
    const COLUMNS: &'static str = "id, description";
    const ORDER_BY: &'static str = "id ASC";

    fn from_row(row: &Row<'_>) -> RepoResult<Self> {
        Ok(Self {
            id: row.get("id")?,
            description: row.get("description")?,
        })
    }
}

/// Read access to key rows.
pub trait KeyRepository {
    /// Loads one key row by identifier.
    fn find_by_id(&self, id: &str) -> RepoResult<Option<PropertyKey>>;
    /// Loads every key row.
    fn find_all(&self) -> RepoResult<Vec<PropertyKey>>;
}

/// SQLite-backed key store.
pub struct SqliteKeyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteKeyRepository<'conn> {
    /// Creates the store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl KeyRepository for SqliteKeyRepository<'_> {
    fn find_by_id(&self, id: &str) -> RepoResult<Option<PropertyKey>> {
        let keys = criteria::result_list::<PropertyKey>(
            self.conn,
            &[EqualsCriterion::text(KeyAttribute::Id, id)],
        )?;
        Ok(keys.into_iter().next())
    }

    fn find_all(&self) -> RepoResult<Vec<PropertyKey>> {
        criteria::result_list::<PropertyKey>(self.conn, &[])
    }
}
