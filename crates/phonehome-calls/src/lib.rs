//! Telemetry call ingestion and query engine.
//!
//! Client programs "phone home" anonymous usage events scoped to an
//! organisation/repository pair. This crate holds everything between the
//! HTTP surface and the database:
//!
//! | Component | Entry point |
//! |-----------|-------------|
//! | Payload sanitiser | [`sanitise`] |
//! | Query builder | [`Predicate::build`] |
//! | Event store | [`CallStore`], [`SqliteCallStore`], [`MemoryCallStore`] |
//! | Ingestion | [`IngestService::register`] |
//! | Query / aggregation | [`QueryService`] |
//! | Badge formatter | [`Badge::for_count`] |
//!
//! None of the services carry state between calls; every row lives in the
//! store handed to them at construction.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use phonehome_calls::{FilterQuery, IngestService, QueryService, SqliteCallStore};
//!
//! let store = Arc::new(SqliteCallStore::new(pool));
//! let ingest = IngestService::new(store.clone());
//! let query = QueryService::new(store);
//!
//! ingest.register("datarootsio", "cheek", &origin, br#"{"version": "0.4.1"}"#)?;
//! let total = query.count_calls(&FilterQuery::scoped("datarootsio", "cheek"))?;
//! ```

mod badge;
mod error;
mod ingest;
mod memory;
mod model;
mod predicate;
mod query;
mod sanitise;
mod store;

pub use badge::Badge;
pub use error::{CallError, StoreError};
pub use ingest::{IngestService, Registration};
pub use memory::MemoryCallStore;
pub use model::{Call, DayCount, FilterQuery, GroupBy, NewCall, Payload, ScalarValue};
pub use predicate::{Clause, Predicate};
pub use query::{CountResult, QueryService, LIST_LIMIT};
pub use sanitise::sanitise;
pub use store::{CallStore, SqliteCallStore};
