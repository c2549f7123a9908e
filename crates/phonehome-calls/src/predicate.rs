//! Query builder: turns a [`FilterQuery`] into a conjunctive [`Predicate`].

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::CallError;
use crate::model::{Call, FilterQuery};

/// One condition of a predicate. All clauses of a predicate must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    /// `organisation = ? AND repository = ?`
    Scope {
        organisation: String,
        repository: String,
    },
    /// The payload contains this key, whatever its value.
    HasKey(String),
    /// `timestamp >= ?`
    Since(DateTime<Utc>),
    /// `timestamp < ?`
    Before(DateTime<Utc>),
}

impl Clause {
    pub fn matches(&self, call: &Call) -> bool {
        match self {
            Self::Scope {
                organisation,
                repository,
            } => call.organisation == *organisation && call.repository == *repository,
            Self::HasKey(key) => call.payload.contains_key(key),
            Self::Since(at) => call.timestamp >= *at,
            Self::Before(at) => call.timestamp < *at,
        }
    }
}

/// A scoped, AND-only set of filter clauses.
///
/// The first clause is always [`Clause::Scope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    /// Builds the predicate for a filter.
    ///
    /// An empty `key` is treated as absent. No check is made that
    /// `from_date <= to_date`; an inverted range simply matches nothing.
    ///
    /// # Errors
    ///
    /// Returns `CallError::MissingScope` if organisation or repository is
    /// empty. This is the only validation done here; `group_by` is checked
    /// by the query service.
    pub fn build(filter: &FilterQuery) -> Result<Self, CallError> {
        if !filter.has_scope() {
            return Err(CallError::MissingScope);
        }

        let mut clauses = vec![Clause::Scope {
            organisation: filter.organisation.clone(),
            repository: filter.repository.clone(),
        }];

        if let Some(key) = filter.key.as_deref().filter(|k| !k.is_empty()) {
            clauses.push(Clause::HasKey(key.to_string()));
        }
        if let Some(from) = filter.from_date {
            clauses.push(Clause::Since(start_of_day(from)));
        }
        if let Some(to) = filter.to_date {
            clauses.push(Clause::Before(start_of_day(to)));
        }

        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Evaluates the predicate against a call held in memory.
    pub fn matches(&self, call: &Call) -> bool {
        self.clauses.iter().all(|clause| clause.matches(call))
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}
