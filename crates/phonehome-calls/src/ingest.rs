//! Ingestion service: validates, sanitises and persists one call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::CallError;
use crate::model::{NewCall, Payload};
use crate::sanitise::sanitise;
use crate::store::CallStore;

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// The payload as stored, echoed back to the caller.
    pub payload: Payload,
    /// Whether any key was dropped by the sanitiser.
    pub stripped: bool,
}

/// Registers telemetry calls into a [`CallStore`].
#[derive(Clone)]
pub struct IngestService {
    store: Arc<dyn CallStore>,
}

impl IngestService {
    pub fn new(store: Arc<dyn CallStore>) -> Self {
        Self { store }
    }

    /// Registers one call, timestamped with the server clock.
    ///
    /// `origin` is an opaque, already-anonymised caller fingerprint.
    /// An empty body is treated as `{}`.
    ///
    /// # Errors
    ///
    /// - `CallError::InvalidPayload` if the body is not a JSON object.
    /// - `CallError::MissingScope` if organisation or repository is empty.
    /// - `CallError::Store` if the write fails; nothing is registered then.
    pub fn register(
        &self,
        organisation: &str,
        repository: &str,
        origin: &str,
        raw_body: &[u8],
    ) -> Result<Registration, CallError> {
        self.register_at(organisation, repository, origin, raw_body, Utc::now())
    }

    /// Same as [`register`](Self::register) with an explicit timestamp.
    ///
    /// Only server-side callers (imports, tests) should use this; the
    /// timestamp must never come from the client.
    pub fn register_at(
        &self,
        organisation: &str,
        repository: &str,
        origin: &str,
        raw_body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<Registration, CallError> {
        let body: &[u8] = if raw_body.is_empty() { b"{}" } else { raw_body };

        let invalid = |reason| CallError::InvalidPayload {
            raw: String::from_utf8_lossy(body).into_owned(),
            reason,
        };
        let raw = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(invalid("not a JSON object")),
            Err(_) => return Err(invalid("invalid JSON")),
        };

        let (payload, stripped) = sanitise(&raw);

        if organisation.is_empty() || repository.is_empty() {
            return Err(CallError::MissingScope);
        }

        let call = self.store.create(NewCall {
            timestamp,
            payload: payload.clone(),
            organisation: organisation.to_string(),
            repository: repository.to_string(),
            origin: origin.to_string(),
        })?;

        tracing::info!(
            id = call.id,
            organisation,
            repository,
            keys = payload.len(),
            stripped,
            "registered call"
        );

        Ok(Registration { payload, stripped })
    }
}
