//! Versioned schema of the telemetry database.
//!
//! The applied version lives in SQLite's `user_version` header. Step `n` of
//! the upgrade list takes a database from version `n` to `n + 1` inside one
//! transaction, together with the header bump.

use rusqlite::Connection;

use crate::error::DbError;

const UPGRADES: &[&str] = &[include_str!("schema/001_calls.sql")];

/// Schema version produced by [`upgrade`].
pub const SCHEMA_VERSION: u32 = UPGRADES.len() as u32;

/// Reads the schema version recorded in the database header.
///
/// # Errors
///
/// Returns `DbError::Version` if the pragma cannot be queried.
pub fn schema_version(conn: &Connection) -> Result<u32, DbError> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(DbError::Version)
}

/// Brings the database up to [`SCHEMA_VERSION`] and returns how many
/// upgrade steps were applied.
///
/// # Errors
///
/// - `DbError::SchemaTooNew` if the database is ahead of this build.
/// - `DbError::Upgrade` if a step fails; earlier steps stay committed.
pub fn upgrade(conn: &mut Connection) -> Result<usize, DbError> {
    apply(conn, UPGRADES)
}

fn apply(conn: &mut Connection, steps: &[&str]) -> Result<usize, DbError> {
    let supported = steps.len() as u32;
    let found = schema_version(conn)?;
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    for (version, sql) in (1..).zip(steps).skip(found as usize) {
        let failed = |source: rusqlite::Error| DbError::Upgrade { version, source };

        let tx = conn.transaction().map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", version)
            .map_err(failed)?;
        tx.commit().map_err(failed)?;

        tracing::info!(version, "upgraded database schema");
    }

    Ok((supported - found) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )
        .expect("should query sqlite_master")
    }

    #[test]
    fn fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().expect("should open in-memory db");
        assert_eq!(schema_version(&conn).unwrap(), 0);

        let applied = upgrade(&mut conn).expect("upgrade should succeed");
        assert_eq!(applied, UPGRADES.len());
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
        assert!(table_exists(&conn, "calls"));
    }

    #[test]
    fn upgrade_is_a_no_op_when_current() {
        let mut conn = Connection::open_in_memory().expect("should open in-memory db");
        upgrade(&mut conn).expect("first upgrade should succeed");

        assert_eq!(upgrade(&mut conn).expect("second upgrade should succeed"), 0);
        assert_eq!(schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().expect("should open in-memory db");
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 3)
            .unwrap();

        match upgrade(&mut conn) {
            Err(DbError::SchemaTooNew { found, supported }) => {
                assert_eq!(found, SCHEMA_VERSION + 3);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("expected SchemaTooNew, got {other:?}"),
        }
    }

    #[test]
    fn failed_step_keeps_previous_version() {
        let mut conn = Connection::open_in_memory().expect("should open in-memory db");
        let steps = [
            "CREATE TABLE first_step (id INTEGER PRIMARY KEY);",
            "CREATE TABLE second_step (id INTEGER PRIMARY KEY);
             INSERT INTO no_such_table VALUES (1);",
        ];

        match apply(&mut conn, &steps) {
            Err(DbError::Upgrade { version, .. }) => assert_eq!(version, 2),
            other => panic!("expected Upgrade error, got {other:?}"),
        }

        assert_eq!(schema_version(&conn).unwrap(), 1);
        assert!(table_exists(&conn, "first_step"));
        assert!(!table_exists(&conn, "second_step"));
    }

    #[test]
    fn calls_table_rejects_empty_scope() {
        let mut conn = Connection::open_in_memory().expect("should open in-memory db");
        upgrade(&mut conn).expect("upgrade should succeed");

        for (organisation, repository) in [("", "repo"), ("org", "")] {
            let result = conn.execute(
                "INSERT INTO calls (timestamp, organisation, repository)
                 VALUES ('2024-01-01T00:00:00.000000Z', ?1, ?2)",
                [organisation, repository],
            );
            assert!(result.is_err(), "empty scope must violate the CHECK");
        }
    }
}
