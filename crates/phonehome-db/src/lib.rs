//! SQLite storage for the phonehome telemetry service.
//!
//! [`open`] returns an r2d2 pool over a database whose schema has been
//! brought up to [`SCHEMA_VERSION`]. File databases run in WAL mode so the
//! read-heavy query endpoints never wait on ingestion. The schema version is
//! tracked in SQLite's `user_version` header; upgrade scripts are compiled in
//! with `include_str!`.

mod error;
mod open;
mod schema;

pub use error::DbError;
pub use open::{open, DbPool, DbSettings};
pub use schema::{schema_version, upgrade, SCHEMA_VERSION};
