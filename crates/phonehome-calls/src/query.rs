//! Query and aggregation service.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::badge::Badge;
use crate::error::CallError;
use crate::model::{Call, DayCount, FilterQuery, GroupBy};
use crate::predicate::Predicate;
use crate::store::CallStore;

/// Hard cap on the number of calls returned by a listing.
pub const LIST_LIMIT: usize = 3000;

/// Result of a count request, shaped by its `group_by`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum CountResult {
    Total(i64),
    Daily(Vec<DayCount>),
}

/// Read side over a [`CallStore`].
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn CallStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn CallStore>) -> Self {
        Self { store }
    }

    /// Counts the calls matching the filter.
    ///
    /// # Errors
    ///
    /// `CallError::MissingScope` without organisation and repository,
    /// `CallError::Store` on store failure.
    pub fn count_calls(&self, filter: &FilterQuery) -> Result<i64, CallError> {
        let predicate = Predicate::build(filter)?;
        let count = self.store.count(&predicate)?;
        tracing::debug!(
            organisation = %filter.organisation,
            repository = %filter.repository,
            count,
            "counted calls"
        );
        Ok(count)
    }

    /// Lists the calls matching the filter.
    ///
    /// Results are unordered and silently truncated to [`LIST_LIMIT`] rows.
    pub fn list_calls(&self, filter: &FilterQuery) -> Result<Vec<Call>, CallError> {
        let predicate = Predicate::build(filter)?;
        let calls = self.store.query(&predicate, LIST_LIMIT)?;
        tracing::debug!(
            organisation = %filter.organisation,
            repository = %filter.repository,
            returned = calls.len(),
            "listed calls"
        );
        Ok(calls)
    }

    /// Counts the matching calls per UTC calendar day, ascending by date.
    pub fn count_by_day(&self, filter: &FilterQuery) -> Result<Vec<DayCount>, CallError> {
        let predicate = Predicate::build(filter)?;
        Ok(self.store.aggregate_by_day(&predicate)?)
    }

    /// Dispatches on the filter's `group_by`.
    ///
    /// # Errors
    ///
    /// Scope is checked first, then `CallError::UnsupportedGroupBy` is
    /// returned for anything but `""` and `"day"`.
    pub fn count(&self, filter: &FilterQuery) -> Result<CountResult, CallError> {
        Predicate::build(filter)?;
        match filter.grouping()? {
            GroupBy::None => self.count_calls(filter).map(CountResult::Total),
            GroupBy::Day => self.count_by_day(filter).map(CountResult::Daily),
        }
    }

    /// Builds the shields.io badge for the scope's total call count.
    pub fn badge(&self, organisation: &str, repository: &str) -> Result<Badge, CallError> {
        let count = self.count_calls(&FilterQuery::scoped(organisation, repository))?;
        Ok(Badge::for_count(count))
    }
}
