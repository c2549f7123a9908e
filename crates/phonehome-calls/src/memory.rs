//! In-process [`CallStore`] for tests and throwaway deployments.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::model::{Call, DayCount, NewCall};
use crate::predicate::Predicate;
use crate::store::CallStore;

/// Keeps calls in a vector guarded by a mutex. Ids start at 1.
#[derive(Debug, Default)]
pub struct MemoryCallStore {
    calls: Mutex<Vec<Call>>,
}

impl MemoryCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Call>> {
        // A poisoned guard still holds a consistent vector: every mutation
        // is a single push.
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CallStore for MemoryCallStore {
    fn create(&self, call: NewCall) -> Result<Call, StoreError> {
        let mut calls = self.lock();
        let id = i64::try_from(calls.len()).unwrap_or(i64::MAX - 1) + 1;
        let call = Call::from_new(id, call);
        calls.push(call.clone());
        Ok(call)
    }

    fn query(&self, predicate: &Predicate, limit: usize) -> Result<Vec<Call>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|call| predicate.matches(call))
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self, predicate: &Predicate) -> Result<i64, StoreError> {
        let n = self
            .lock()
            .iter()
            .filter(|call| predicate.matches(call))
            .count();
        Ok(i64::try_from(n).unwrap_or(i64::MAX))
    }

    fn aggregate_by_day(&self, predicate: &Predicate) -> Result<Vec<DayCount>, StoreError> {
        let mut days: BTreeMap<_, i64> = BTreeMap::new();
        for call in self.lock().iter().filter(|call| predicate.matches(call)) {
            *days.entry(call.timestamp.date_naive()).or_default() += 1;
        }

        Ok(days
            .into_iter()
            .map(|(date, count)| DayCount { date, count })
            .collect())
    }
}
