// Storage gateway - owns the SQLite connection
// Statement execution, transactions and schema creation all go through here

use rusqlite::{Connection, OptionalExtension, Params, Row};
use std::path::{Path, PathBuf};

use crate::error::{CoinbookError, CoinbookResult};

/// Name of the database file under the data directory.
const DB_FILE_NAME: &str = "coinbook.db";

/// Default location of the durable store: `$COINBOOK_HOME/coinbook.db` when
/// the variable is set, else `~/.coinbook/coinbook.db`.
pub fn default_db_path() -> PathBuf {
    if let Ok(custom) = std::env::var("COINBOOK_HOME") {
        return PathBuf::from(custom).join(DB_FILE_NAME);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".coinbook")
        .join(DB_FILE_NAME)
}

/// Single-connection SQLite gateway. One instance per logical writer; the
/// import pipeline opens a second short-lived instance against the same file
/// so long imports do not block the primary connection.
pub struct Database {
    conn: Option<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (creating if needed) the database file at `path`. Parent
    /// directories are created on demand.
    pub fn open(path: impl AsRef<Path>) -> CoinbookResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let conn = Connection::open(path)?;
        // Cascade deletes need the pragma on every connection; WAL lets a
        // second import connection write while the primary keeps reading.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        tracing::info!("database opened at {}", path.display());

        Ok(Database {
            conn: Some(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database, used by tests and throwaway work.
    pub fn open_in_memory() -> CoinbookResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        tracing::debug!("in-memory database opened");

        Ok(Database {
            conn: Some(conn),
            path: None,
        })
    }

    /// True when this instance has no backing file. An in-memory store
    /// cannot be shared across handles, which the import pipeline uses to
    /// decide its connection policy.
    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }

    /// Backing file path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the connection. Further calls on this instance fail with
    /// `CoinbookError::NotConnected`.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_conn, err)) = conn.close() {
                tracing::warn!("error closing database connection: {err}");
            } else {
                tracing::debug!("database connection closed");
            }
        }
    }

    fn conn(&self) -> CoinbookResult<&Connection> {
        self.conn.as_ref().ok_or(CoinbookError::NotConnected)
    }

    // ========================================================================
    // SCHEMA
    // ========================================================================

    /// Create tables and indexes. Idempotent; safe to call on every startup.
    pub fn init_schema(&self) -> CoinbookResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // parent is a name reference, nullable for top-level rows. SQLite
        // treats NULLs as distinct inside UNIQUE, so the catalog still has
        // to check existence before inserting top-level categories.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                parent TEXT,
                UNIQUE(name, parent)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                date DATE NOT NULL,
                type TEXT NOT NULL CHECK(type IN ('Income', 'Expense')),
                amount REAL NOT NULL CHECK(amount >= 0),
                category TEXT NOT NULL,
                subcategory TEXT,
                note TEXT,
                FOREIGN KEY (profile_id) REFERENCES profiles(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_profile ON entries(profile_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_date ON entries(date)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_type ON entries(type)",
            [],
        )?;

        tracing::debug!("database schema ready");
        Ok(())
    }

    // ========================================================================
    // STATEMENTS
    // ========================================================================

    /// Run a mutating statement. Returns the new rowid for INSERTs and the
    /// affected-row count for everything else, so insert call sites never
    /// need a follow-up id query.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> CoinbookResult<i64> {
        let conn = self.conn()?;
        let affected = conn.execute(sql, params).map_err(|err| {
            tracing::error!("SQL execution failed: {err} ({sql})");
            CoinbookError::from(err)
        })?;

        if is_insert(sql) {
            Ok(conn.last_insert_rowid())
        } else {
            Ok(affected as i64)
        }
    }

    /// Run a query and map every row through `f`.
    pub fn fetch_all<T, P, F>(&self, sql: &str, params: P, f: F) -> CoinbookResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, f)
            .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<T>>>())
            .map_err(|err| {
                tracing::error!("SQL query failed: {err} ({sql})");
                CoinbookError::from(err)
            })?;
        Ok(rows)
    }

    /// Run a query expected to match at most one row.
    pub fn fetch_one<T, P, F>(&self, sql: &str, params: P, f: F) -> CoinbookResult<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn()?;
        let row = conn.query_row(sql, params, f).optional().map_err(|err| {
            tracing::error!("SQL query failed: {err} ({sql})");
            CoinbookError::from(err)
        })?;
        Ok(row)
    }

    // ========================================================================
    // TRANSACTIONS
    // ========================================================================

    /// Start an explicit transaction.
    pub fn begin(&self) -> CoinbookResult<()> {
        self.conn()?.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Commit the open transaction. A no-op when none is active, so call
    /// sites can pair every mutation with a commit unconditionally.
    pub fn commit(&self) -> CoinbookResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Roll back the open transaction. A no-op when none is active.
    pub fn rollback(&self) -> CoinbookResult<()> {
        let conn = self.conn()?;
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }
}

/// INSERT statements report the generated rowid instead of the row count.
fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("INSERT"))
}

// ============================================================================
// TESTS
// ============================================================================
