//! Call records, payload values, filters and derived aggregates.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::CallError;

/// A single payload value. Only flat scalars are ever stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A JSON number without fractional part that fits in an `i64`.
    Integer(i64),
    /// Any other JSON number.
    Float(f64),
    /// A JSON string.
    String(String),
}

impl ScalarValue {
    /// Classifies a decoded JSON value.
    ///
    /// Returns `None` for everything that must be stripped: objects, arrays,
    /// booleans and `null`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Converts back into a JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Value::from(*f),
            Self::String(s) => Value::from(s.as_str()),
        }
    }
}

/// A structurally flat payload: string keys mapped to scalar values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, ScalarValue>);

impl Payload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous one for that key.
    pub fn insert(&mut self, key: impl Into<String>, value: ScalarValue) -> Option<ScalarValue> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the payload as a JSON object.
    pub fn to_json(&self) -> serde_json::Map<String, Value> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

impl FromIterator<(String, ScalarValue)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, ScalarValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A call that has not been persisted yet.
///
/// The timestamp is always assigned server side.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCall {
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub organisation: String,
    pub repository: String,
    /// SHA-256 hex digest of the caller's address.
    pub origin: String,
}

/// A persisted telemetry call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Call {
    /// Store-assigned surrogate key, never exposed over the API.
    #[serde(skip)]
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub organisation: String,
    pub repository: String,
    #[serde(skip)]
    pub origin: String,
}

impl Call {
    /// Attaches a store-assigned id to a new call.
    pub fn from_new(id: i64, call: NewCall) -> Self {
        Self {
            id,
            timestamp: call.timestamp,
            payload: call.payload,
            organisation: call.organisation,
            repository: call.repository,
            origin: call.origin,
        }
    }
}

/// Number of calls recorded on one calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DayCount {
    /// Serialised as `YYYY-MM-DD`.
    pub date: NaiveDate,
    pub count: i64,
}

/// Aggregation applied by the count endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// A single total.
    None,
    /// One [`DayCount`] per calendar day.
    Day,
}

impl std::str::FromStr for GroupBy {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(Self::None),
            "day" => Ok(Self::Day),
            other => Err(CallError::UnsupportedGroupBy(other.to_string())),
        }
    }
}

/// Filter applied to every lookup. Also echoed back to API callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FilterQuery {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub organisation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    /// Restricts to calls whose payload contains this key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Inclusive lower bound, midnight UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_date: Option<NaiveDate>,
    /// Exclusive upper bound, midnight UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group_by: String,
}

impl FilterQuery {
    /// A filter with only the scope set.
    pub fn scoped(organisation: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            organisation: organisation.into(),
            repository: repository.into(),
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn since(mut self, date: NaiveDate) -> Self {
        self.from_date = Some(date);
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.to_date = Some(date);
        self
    }

    /// Parses the raw `group_by` value.
    ///
    /// # Errors
    ///
    /// Returns `CallError::UnsupportedGroupBy` naming the offending value.
    pub fn grouping(&self) -> Result<GroupBy, CallError> {
        self.group_by.parse()
    }

    pub(crate) fn has_scope(&self) -> bool {
        !self.organisation.is_empty() && !self.repository.is_empty()
    }
}
