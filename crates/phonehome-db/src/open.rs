//! Opening the telemetry database as a ready-to-use connection pool.

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::DbError;
use crate::schema;

/// Pool of SQLite connections to an upgraded telemetry database.
pub type DbPool = Pool<SqliteConnectionManager>;

const IN_MEMORY: &str = ":memory:";

/// Location and tuning of the telemetry database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    /// Database file, or `:memory:` for a private in-memory database.
    pub path: String,
    /// How long a connection waits on a locked database.
    pub busy_timeout: Duration,
    /// Upper bound on pooled connections. Ignored for `:memory:`.
    pub max_connections: u32,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            path: "phonehome.db".to_string(),
            busy_timeout: Duration::from_secs(5),
            max_connections: 8,
        }
    }
}

impl DbSettings {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// A fresh database that lives as long as the returned pool.
    pub fn in_memory() -> Self {
        Self::file(IN_MEMORY)
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY
    }
}

/// Per-connection setup.
///
/// File databases run in WAL mode with `synchronous = NORMAL`: readers never
/// block the ingest writer, and a crash can lose at most the last commits.
fn configure(conn: &Connection, busy_timeout: Duration, in_memory: bool) -> rusqlite::Result<()> {
    conn.busy_timeout(busy_timeout)?;
    if in_memory {
        return Ok(());
    }

    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode stayed '{mode}' instead of WAL")),
        ));
    }
    conn.pragma_update(None, "synchronous", "NORMAL")
}

/// Opens the database, upgrades its schema and returns the pool.
///
/// Every connection to `:memory:` would open a separate empty database, so
/// an in-memory pool is pinned to a single connection.
///
/// # Errors
///
/// - `DbError::Pool` if no connection can be established.
/// - `DbError::SchemaTooNew` or `DbError::Upgrade` from the schema upgrade.
pub fn open(settings: &DbSettings) -> Result<DbPool, DbError> {
    let in_memory = settings.is_in_memory();
    let manager = if in_memory {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(&settings.path)
    };
    let busy_timeout = settings.busy_timeout;
    let manager = manager.with_init(move |conn| configure(conn, busy_timeout, in_memory));

    let max_size = if in_memory {
        1
    } else {
        settings.max_connections.max(1)
    };
    let pool = Pool::builder().max_size(max_size).build(manager)?;

    let applied = {
        let mut conn = pool.get()?;
        schema::upgrade(&mut conn)?
    };

    tracing::info!(
        path = %settings.path,
        connections = max_size,
        schema_version = schema::SCHEMA_VERSION,
        applied,
        "telemetry database ready"
    );

    Ok(pool)
}
