//! Payload sanitiser: keeps flat scalar values, strips everything else.

use serde_json::{Map, Value};

use crate::model::{Payload, ScalarValue};

/// Reduces a decoded JSON object to a storage-safe flat [`Payload`].
///
/// Strings, integers and floats are kept unchanged. Objects, arrays,
/// booleans and `null` are dropped. The returned flag is `true` when at
/// least one key was dropped. The input is never modified.
pub fn sanitise(raw: &Map<String, Value>) -> (Payload, bool) {
    let mut stripped = false;
    let clean = raw
        .iter()
        .filter_map(|(key, value)| match ScalarValue::from_json(value) {
            Some(scalar) => Some((key.clone(), scalar)),
            None => {
                tracing::debug!(key = %key, "stripping non-scalar payload value");
                stripped = true;
                None
            }
        })
        .collect();

    (clean, stripped)
}
