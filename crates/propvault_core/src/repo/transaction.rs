//! Write-side transaction boundary.
//!
//! # Responsibility
//! - Collect staged inserts/deletes inside one [`WriteScope`].
//! - Apply a scope's changes all-or-nothing on `end()`.
//!
//! # Invariants
//! - Every scope is closed exactly once: committed by `end()` or discarded
//!   on drop.
//! - Staged changes are applied in staging order inside one SQLite
//!   `IMMEDIATE` transaction; any failure rolls back every change.

use super::{RepoError, RepoResult};
use crate::model::entity::{Entity, PropertyKey, PropertyValue};
use log::{debug, warn};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

/// One staged row mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedChange {
    Insert(Entity),
    Delete(Entity),
}

impl StagedChange {
    pub fn entity(&self) -> &Entity {
        match self {
            Self::Insert(entity) | Self::Delete(entity) => entity,
        }
    }
}

/// Transaction boundary used by mutating service operations.
pub trait TransactionManager {
    /// Opens a write scope.
    fn begin(&self) -> RepoResult<WriteScope<'_>>
    where
        Self: Sized,
    {
        Ok(WriteScope::new(self))
    }

    /// Applies `changes` atomically.
    fn commit(&self, changes: Vec<StagedChange>) -> RepoResult<()>;

    /// Called when a scope is dropped without `end()`.
    fn discard(&self, changes: Vec<StagedChange>) {
        debug!(
            "event=tx_discard module=repo status=ok staged={}",
            changes.len()
        );
    }
}

/// Scoped write transaction. Dropping it without `end()` discards staged work.
pub struct WriteScope<'m> {
    manager: &'m dyn TransactionManager,
    staged: Vec<StagedChange>,
    open: bool,
}

impl<'m> WriteScope<'m> {
    pub fn new(manager: &'m dyn TransactionManager) -> Self {
        Self {
            manager,
            staged: Vec::new(),
            open: true,
        }
    }

    pub fn stage_insert(&mut self, entity: impl Into<Entity>) {
        self.staged.push(StagedChange::Insert(entity.into()));
    }

    pub fn stage_delete(&mut self, entity: impl Into<Entity>) {
        self.staged.push(StagedChange::Delete(entity.into()));
    }

    pub fn staged(&self) -> &[StagedChange] {
        &self.staged
    }

    /// Commits all staged changes and closes the scope.
    pub fn end(mut self) -> RepoResult<()> {
        self.open = false;
        let changes = std::mem::take(&mut self.staged);
        self.manager.commit(changes)
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            self.manager.discard(std::mem::take(&mut self.staged));
        }
    }
}

/// SQLite-backed transaction boundary.
pub struct SqliteTransactionManager<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTransactionManager<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl TransactionManager for SqliteTransactionManager<'_> {
    fn commit(&self, changes: Vec<StagedChange>) -> RepoResult<()> {
        if changes.is_empty() {
            debug!("event=tx_commit module=repo status=noop staged=0");
            return Ok(());
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for change in &changes {
            if let Err(err) = apply_change(&tx, change) {
                warn!(
                    "event=tx_commit module=repo status=rollback staged={} failed_entity={} error={}",
                    changes.len(),
                    change.entity().kind(),
                    err
                );
                return Err(err);
            }
        }
        tx.commit()?;

        debug!(
            "event=tx_commit module=repo status=ok staged={}",
            changes.len()
        );
        Ok(())
    }
}

fn apply_change(conn: &Connection, change: &StagedChange) -> RepoResult<()> {
    match change {
        StagedChange::Insert(Entity::Key(key)) => insert_key(conn, key),
        StagedChange::Insert(Entity::Value(value)) => insert_value(conn, value),
        StagedChange::Delete(Entity::Key(key)) => delete_key(conn, key),
        StagedChange::Delete(Entity::Value(value)) => delete_value(conn, value),
    }
}

fn insert_key(conn: &Connection, key: &PropertyKey) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO property_keys (id, description) VALUES (?1, ?2);",
        params![key.id, key.description],
    )?;
    Ok(())
}

fn insert_value(conn: &Connection, value: &PropertyValue) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO property_values (key_id, pattern, change_set, payload)
         VALUES (?1, ?2, ?3, ?4);",
        params![value.key_id, value.pattern, value.change_set, value.payload],
    )?;
    Ok(())
}

fn delete_key(conn: &Connection, key: &PropertyKey) -> RepoResult<()> {
    let changed = conn.execute("DELETE FROM property_keys WHERE id = ?1;", [&key.id])?;
    if changed == 0 {
        return Err(RepoError::StaleDelete {
            entity: "key",
            id: key.id.clone(),
        });
    }
    Ok(())
}

fn delete_value(conn: &Connection, value: &PropertyValue) -> RepoResult<()> {
    let changed = conn.execute(
        "DELETE FROM property_values
         WHERE key_id = ?1
           AND pattern = ?2
           AND change_set IS ?3;",
        params![value.key_id, value.pattern, value.change_set],
    )?;
    if changed == 0 {
        return Err(RepoError::StaleDelete {
            entity: "value",
            id: format!("{}/{}", value.key_id, value.pattern),
        });
    }
    Ok(())
}
