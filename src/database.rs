use log::{debug, info};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::FileTreeError;
use crate::schema::{CREATE_SCHEMA_SQL, SCHEMA_VERSION};

pub const DB_FILENAME: &str = "filetree.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_SIZE: u32 = 8;
const POOL_TIMEOUT: Duration = Duration::from_secs(30);

pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Pooled handle to the SQLite file holding the tree.
///
/// Clones share the same pool, so a `Database` can be handed to worker threads.
#[derive(Clone)]
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and make sure the schema is current.
    pub fn open(db_path: &Path) -> Result<Self, FileTreeError> {
        Self::open_with_pool_size(db_path, POOL_SIZE)
    }

    /// Like [`Database::open`], with room for `max_size` concurrent connections.
    pub fn open_with_pool_size(db_path: &Path, max_size: u32) -> Result<Self, FileTreeError> {
        Self::open_with_pool_options(db_path, max_size, POOL_TIMEOUT)
    }

    /// Like [`Database::open_with_pool_size`]; `connection_timeout` bounds how long
    /// [`Database::get_connection`] waits for a free connection.
    pub fn open_with_pool_options(
        db_path: &Path,
        max_size: u32,
        connection_timeout: Duration,
    ) -> Result<Self, FileTreeError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(FileTreeError::Error(format!(
                    "Database folder '{}' does not exist or is not a directory",
                    parent.display()
                )));
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(configure_connection);

        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .connection_timeout(connection_timeout)
            .build(manager)?;

        let db = Database {
            pool,
            path: db_path.to_path_buf(),
        };

        let conn = db.get_connection()?;
        Self::ensure_schema(&conn)?;
        info!("Database opened at: {}", db_path.display());

        Ok(db)
    }

    /// Open `filetree.db` inside `db_folder`.
    pub fn open_in_folder(db_folder: &Path) -> Result<Self, FileTreeError> {
        if !db_folder.is_dir() {
            return Err(FileTreeError::Error(format!(
                "Database folder '{}' does not exist or is not a directory",
                db_folder.display()
            )));
        }
        Self::open(&db_folder.join(DB_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_connection(&self) -> Result<DbConnection, FileTreeError> {
        self.pool.get().map_err(FileTreeError::PoolError)
    }

    /// A connection outside the pool, for bookkeeping that must not wait on it.
    pub fn connect_unpooled(&self) -> Result<Connection, FileTreeError> {
        let mut conn = Connection::open(&self.path)?;
        configure_connection(&mut conn)?;
        Ok(conn)
    }

    fn ensure_schema(conn: &Connection) -> Result<(), FileTreeError> {
        let table_exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
                [],
                |row| row.get::<_, i32>(0),
            )
            .map(|count| count > 0)?;

        if !table_exists {
            debug!("Creating schema version {}", SCHEMA_VERSION);
            conn.execute_batch(CREATE_SCHEMA_SQL)?;
            return Ok(());
        }

        let stored_version = Self::get_meta_value_locked(conn, "schema_version")?;

        match stored_version.as_deref() {
            Some(SCHEMA_VERSION) => Ok(()),
            Some(other) => Err(FileTreeError::Error(format!(
                "Schema version mismatch: database has '{}', expected '{}'",
                other, SCHEMA_VERSION
            ))),
            None => Err(FileTreeError::Error("Schema version missing".to_string())),
        }
    }

    /// Run `f` inside `BEGIN IMMEDIATE ... COMMIT`, rolling back if it fails.
    ///
    /// Taking the write lock up front keeps read-then-write sequences (such as
    /// sibling name resolution followed by an insert) atomic across connections.
    pub fn immediate_transaction<F, T>(conn: &Connection, f: F) -> Result<T, FileTreeError>
    where
        F: FnOnce(&Connection) -> Result<T, FileTreeError>,
    {
        conn.execute_batch("BEGIN IMMEDIATE")?;

        match f(conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    log::error!("Failed to roll back transaction: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    pub fn get_meta_value_locked(
        conn: &Connection,
        key: &str,
    ) -> Result<Option<String>, FileTreeError> {
        conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(FileTreeError::DatabaseError)
    }
}

fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_schema() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_folder(dir.path()).unwrap();
        let conn = db.get_connection().unwrap();

        let version = Database::get_meta_value_locked(&conn, "schema_version").unwrap();
        assert_eq!(version.as_deref(), Some(SCHEMA_VERSION));

        let tables: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name LIKE 'tree_%'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 5);
    }

    #[test]
    fn test_reopen_accepts_current_schema() {
        let dir = TempDir::new().unwrap();
        drop(Database::open_in_folder(dir.path()).unwrap());
        assert!(Database::open_in_folder(dir.path()).is_ok());
    }

    #[test]
    fn test_reopen_rejects_unknown_schema_version() {
        let dir = TempDir::new().unwrap();
        {
            let db = Database::open_in_folder(dir.path()).unwrap();
            let conn = db.get_connection().unwrap();
            conn.execute(
                "UPDATE meta SET value = '99' WHERE key = 'schema_version'",
                [],
            )
            .unwrap();
        }
        let err = Database::open_in_folder(dir.path()).err().unwrap();
        assert!(err.to_string().contains("Schema version mismatch"));
    }

    #[test]
    fn test_open_in_missing_folder_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(Database::open_in_folder(&missing).is_err());
    }

    #[test]
    fn test_immediate_transaction_rolls_back_on_error() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_in_folder(dir.path()).unwrap();
        let conn = db.get_connection().unwrap();

        let result: Result<(), FileTreeError> = Database::immediate_transaction(&conn, |c| {
            c.execute("INSERT INTO meta (key, value) VALUES ('scratch', 'x')", [])?;
            Err(FileTreeError::Error("boom".into()))
        });
        assert!(result.is_err());

        let scratch = Database::get_meta_value_locked(&conn, "scratch").unwrap();
        assert_eq!(scratch, None);
    }

    #[test]
    fn test_unpooled_connection_works_while_pool_is_exhausted() {
        let dir = TempDir::new().unwrap();
        let db = Database::open_with_pool_options(
            &dir.path().join(DB_FILENAME),
            1,
            Duration::from_millis(100),
        )
        .unwrap();

        let _held = db.get_connection().unwrap();
        assert!(matches!(db.get_connection(), Err(FileTreeError::PoolError(_))));

        let conn = db.connect_unpooled().unwrap();
        let version = Database::get_meta_value_locked(&conn, "schema_version").unwrap();
        assert_eq!(version.as_deref(), Some(SCHEMA_VERSION));
    }
}
