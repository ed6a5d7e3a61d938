use std::{path::Path, time::Duration};

use anyhow::anyhow;
use rusqlite::Connection;

use crate::{
    config::Database,
    storage::{error::StorageError, schema},
};

fn open_in_memory() -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

fn open_from_file(path: &Path) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    // lets readers proceed while an ingestion holds the write lock
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("{} opened in {mode} journal mode", path.to_string_lossy());
    Ok(conn)
}

/// Opens a connection and makes sure the schema exists.
pub fn open(config: &Database) -> Result<rusqlite::Connection, StorageError> {
    let db = if config.in_memory {
        open_in_memory()?
    } else {
        let path = config.path.as_ref().ok_or_else(|| {
            StorageError::Internal(anyhow!("database.path is required unless in_memory is set"))
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        open_from_file(path)?
    };
    configure(&db, config.busy_timeout())?;
    schema::init(&db)?;
    Ok(db)
}

fn configure(db: &Connection, busy_timeout: Duration) -> Result<(), rusqlite::Error> {
    db.pragma_update(None, "foreign_keys", true)?;
    db.busy_timeout(busy_timeout)
}
