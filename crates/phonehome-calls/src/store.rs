//! Persistence for telemetry calls.
//!
//! [`CallStore`] is the capability the services are built on. Writes go
//! through [`CallStore::create`]; reads take a [`Predicate`] that
//! [`SqliteCallStore`] renders into a parameterised `WHERE` clause.

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use phonehome_db::DbPool;
use rusqlite::types::ToSql;
use rusqlite::params;

use crate::error::StoreError;
use crate::model::{Call, DayCount, NewCall, Payload};
use crate::predicate::{Clause, Predicate};

/// Durable collection of calls.
///
/// Implementations own every row: nothing is updated or deleted after
/// [`create`](CallStore::create) returns.
pub trait CallStore: Send + Sync {
    /// Persists a call and returns it with its assigned id.
    fn create(&self, call: NewCall) -> Result<Call, StoreError>;

    /// Returns at most `limit` calls matching the predicate, in no
    /// particular order.
    fn query(&self, predicate: &Predicate, limit: usize) -> Result<Vec<Call>, StoreError>;

    /// Counts the calls matching the predicate.
    fn count(&self, predicate: &Predicate) -> Result<i64, StoreError>;

    /// Counts matching calls per calendar day, ascending by date.
    fn aggregate_by_day(&self, predicate: &Predicate) -> Result<Vec<DayCount>, StoreError>;
}

/// [`CallStore`] backed by the `calls` table of a SQLite pool.
///
/// Timestamps are stored as fixed-width UTC RFC 3339 strings with
/// microsecond precision so that string comparison orders them correctly
/// and the first ten characters are the calendar day.
#[derive(Clone)]
pub struct SqliteCallStore {
    pool: DbPool,
}

impl SqliteCallStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for SqliteCallStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCallStore")
            .field("max_size", &self.pool.max_size())
            .finish()
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Timestamp(format!("{raw}: {e}")))
}

/// Renders the predicate as a `WHERE` body plus its bound parameters.
///
/// Parameters are numbered from `?1`; nothing from the filter is
/// interpolated into the SQL text.
fn where_clause(predicate: &Predicate) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses = Vec::with_capacity(predicate.clauses().len());
    let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

    for clause in predicate.clauses() {
        let idx = param_values.len() + 1;
        match clause {
            Clause::Scope {
                organisation,
                repository,
            } => {
                clauses.push(format!("organisation = ?{idx} AND repository = ?{}", idx + 1));
                param_values.push(Box::new(organisation.clone()));
                param_values.push(Box::new(repository.clone()));
            }
            Clause::HasKey(key) => {
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(calls.payload) WHERE json_each.key = ?{idx})"
                ));
                param_values.push(Box::new(key.clone()));
            }
            Clause::Since(at) => {
                clauses.push(format!("timestamp >= ?{idx}"));
                param_values.push(Box::new(format_timestamp(at)));
            }
            Clause::Before(at) => {
                clauses.push(format!("timestamp < ?{idx}"));
                param_values.push(Box::new(format_timestamp(at)));
            }
        }
    }

    (clauses.join(" AND "), param_values)
}

impl CallStore for SqliteCallStore {
    fn create(&self, call: NewCall) -> Result<Call, StoreError> {
        let conn = self.pool.get()?;
        let call = NewCall {
            timestamp: call.timestamp.trunc_subsecs(6),
            ..call
        };
        let payload_json = serde_json::to_string(&call.payload)?;

        let id: i64 = conn.query_row(
            "INSERT INTO calls (timestamp, payload, organisation, repository, origin)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
            params![
                format_timestamp(&call.timestamp),
                payload_json,
                call.organisation,
                call.repository,
                call.origin,
            ],
            |row| row.get(0),
        )?;

        Ok(Call::from_new(id, call))
    }

    fn query(&self, predicate: &Predicate, limit: usize) -> Result<Vec<Call>, StoreError> {
        let conn = self.pool.get()?;
        let (where_sql, mut param_values) = where_clause(predicate);
        let limit_idx = param_values.len() + 1;
        param_values.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));

        let sql = format!(
            "SELECT id, timestamp, payload, organisation, repository, origin
             FROM calls
             WHERE {where_sql}
             ORDER BY id ASC
             LIMIT ?{limit_idx}"
        );
        let params_refs: Vec<&dyn ToSql> = param_values.iter().map(|p| &**p).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut calls = Vec::new();
        for row in rows {
            let (id, timestamp, payload, organisation, repository, origin) = row?;
            calls.push(Call {
                id,
                timestamp: parse_timestamp(&timestamp)?,
                payload: serde_json::from_str::<Payload>(&payload)?,
                organisation,
                repository,
                origin,
            });
        }

        Ok(calls)
    }

    fn count(&self, predicate: &Predicate) -> Result<i64, StoreError> {
        let conn = self.pool.get()?;
        let (where_sql, param_values) = where_clause(predicate);
        let params_refs: Vec<&dyn ToSql> = param_values.iter().map(|p| &**p).collect();

        let count = conn.query_row(
            &format!("SELECT COUNT(*) FROM calls WHERE {where_sql}"),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        Ok(count)
    }

    fn aggregate_by_day(&self, predicate: &Predicate) -> Result<Vec<DayCount>, StoreError> {
        let conn = self.pool.get()?;
        let (where_sql, param_values) = where_clause(predicate);
        let params_refs: Vec<&dyn ToSql> = param_values.iter().map(|p| &**p).collect();

        let sql = format!(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*)
             FROM calls
             WHERE {where_sql}
             GROUP BY day
             ORDER BY day ASC"
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut days = Vec::new();
        for row in rows {
            let (day, count) = row?;
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| StoreError::Timestamp(format!("{day}: {e}")))?;
            days.push(DayCount { date, count });
        }

        Ok(days)
    }
}
