use thiserror::Error;

/// Failures while opening or upgrading the telemetry database.
#[derive(Debug, Error)]
pub enum DbError {
    /// The connection pool could not be built or handed out a connection.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The `user_version` header could not be read.
    #[error("failed to read schema version: {0}")]
    Version(#[source] rusqlite::Error),

    /// Upgrading to `version` failed; the database stays at the previous version.
    #[error("schema upgrade to version {version} failed: {source}")]
    Upgrade {
        version: u32,
        #[source]
        source: rusqlite::Error,
    },

    /// The file was written by a newer build.
    #[error("database schema version {found} is newer than the supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },
}
