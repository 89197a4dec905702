//! Schema migrations, tracked through `PRAGMA user_version`.
//!
//! Every entry in [`MIGRATIONS`] moves the schema up by one version and runs
//! inside its own transaction together with the version bump.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Step = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// Ordered migration steps. Index `i` upgrades version `i` to `i + 1`.
const MIGRATIONS: &[(&str, Step)] = &[("v001_initial", v001_initial::up)];

/// Schema version of a fully migrated database.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

pub fn schema_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Apply every migration newer than the database's `user_version`.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;
    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    tracing::debug!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    for (index, (name, step)) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        tracing::info!(migration = name, version, "applying migration");

        let tx = conn.unchecked_transaction()?;
        step(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
    }

    Ok(())
}
