//! Database connection management.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::migrations::run_migrations;

/// Opens (or creates) the database and runs migrations.
///
/// - If `dir` is `Some`, uses `{dir}/reelshelf.db`.
/// - Otherwise uses `~/.local/share/reelshelf/reelshelf.db`.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrations fail.
pub fn open_db(dir: Option<&PathBuf>) -> Result<Connection> {
    let db_path = resolve_db_path(dir)?;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.display()))?;
    tracing::debug!(path = %db_path.display(), "Database opened");

    run_migrations(&conn).context("database migration failed")?;

    Ok(conn)
}

/// Opens a migrated in-memory database.
///
/// # Errors
///
/// Returns an error if migrations fail.
pub fn open_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    run_migrations(&conn).context("database migration failed")?;
    Ok(conn)
}

/// Resolves the database file path.
fn resolve_db_path(dir: Option<&PathBuf>) -> Result<PathBuf> {
    if let Some(d) = dir {
        return Ok(d.join("reelshelf.db"));
    }

    let home = std::env::var("HOME").context("HOME environment variable is not set")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("reelshelf")
        .join("reelshelf.db"))
}
