//! shields.io endpoint badge.
//!
//! See <https://shields.io/badges/endpoint-badge> for the schema.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A shields.io endpoint badge describing a call count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub schema_version: u8,
    pub label: String,
    pub message: String,
    pub color: String,
}

impl Badge {
    pub fn for_count(count: i64) -> Self {
        Self {
            schema_version: 1,
            label: "telemetry".to_string(),
            message: count.to_string(),
            color: "brightgreen".to_string(),
        }
    }
}
