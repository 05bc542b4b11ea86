//! Schema migrations for the property store.
//!
//! # Invariants
//! - Versions are strictly increasing, starting at 1.
//! - The applied version is mirrored to `PRAGMA user_version`.
//! - A pending batch commits as a whole or not at all.

use crate::db::{DbError, DbResult};
use log::{debug, info};
use rusqlite::{Connection, Transaction};
use std::cmp::Ordering;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "property_store",
    sql: include_str!("0001_property_store.sql"),
}];

/// Schema version the property store expects after bootstrap.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings the schema up to [`latest_version`].
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the database is newer than this build.
/// - `Migration` naming the first script that failed.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from_version = current_user_version(conn)?;
    let to_version = latest_version();

    match from_version.cmp(&to_version) {
        Ordering::Greater => Err(DbError::UnsupportedSchemaVersion {
            db_version: from_version,
            latest_supported: to_version,
        }),
        Ordering::Equal => {
            debug!("event=db_migrate module=db status=noop version={from_version}");
            Ok(())
        }
        Ordering::Less => {
            let tx = conn.transaction()?;
            for migration in MIGRATIONS.iter().filter(|m| m.version > from_version) {
                run_migration(&tx, migration)?;
            }
            tx.commit()?;

            info!(
                "event=db_migrate module=db status=ok from_version={} to_version={}",
                from_version, to_version
            );
            Ok(())
        }
    }
}

/// Schema version currently recorded in the database header.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

fn run_migration(tx: &Transaction<'_>, migration: &Migration) -> DbResult<()> {
    let script = format!(
        "{}\nPRAGMA user_version = {};",
        migration.sql, migration.version
    );
    tx.execute_batch(&script).map_err(|source| DbError::Migration {
        version: migration.version,
        name: migration.name,
        source,
    })
}
