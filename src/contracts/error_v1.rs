//! JSON error envelope shared by every endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBodyV1 {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// `{ "error": { code, message, details?, timestamp } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelopeV1 {
    pub error: ErrorBodyV1,
}

impl ErrorEnvelopeV1 {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBodyV1 {
                code: code.into(),
                message: message.into(),
                details: None,
                timestamp: Utc::now(),
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}
