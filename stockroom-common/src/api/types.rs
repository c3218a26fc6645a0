//! Shared API response types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error body returned by every endpoint
///
/// # Examples
///
/// ```
/// use stockroom_common::api::types::ErrorResponse;
///
/// let body = ErrorResponse::new("INSUFFICIENT_STOCK", "item 7 would drop below zero");
/// let json = serde_json::to_value(&body).unwrap();
/// assert_eq!(json["code"], "INSUFFICIENT_STOCK");
/// assert!(json.get("referencingEntities").is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(
        rename = "referencingEntities",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub referencing_entities: Option<Vec<Value>>,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.to_string(),
            referencing_entities: None,
        }
    }

    pub fn with_referencing(mut self, rows: Vec<Value>) -> Self {
        self.referencing_entities = Some(rows);
        self
    }
}
