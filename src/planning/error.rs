use serde::{Deserialize, Serialize};

use crate::api_connection::ApiConnectionError;
use crate::models::{Slot, ValidationError};
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    NotFound(String),
    #[error("invalid completion output: {0}")]
    Validation(#[from] ValidationError),
    #[error("completion endpoint failed: {0}")]
    Completion(#[from] ApiConnectionError),
    #[error("document store failed: {0}")]
    Store(#[from] StoreError),
    #[error("RAG is not available: {0}")]
    RagUnavailable(String),
    #[error("Failed generating {slot}: {message}")]
    SlotGeneration { slot: Slot, message: String },
}

/// Failure body returned by every entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

impl PlanError {
    /// Maps the error onto the response body, using `summary` for failures
    /// whose raw message belongs in `details`.
    pub fn to_response(&self, summary: &str) -> ErrorResponse {
        match self {
            PlanError::InvalidRequest(msg) | PlanError::Unauthenticated(msg) | PlanError::NotFound(msg) => {
                ErrorResponse::new(msg.clone())
            }
            PlanError::RagUnavailable(details) => ErrorResponse::with_details("RAG is not available", details.clone()),
            PlanError::SlotGeneration { slot, message } => {
                ErrorResponse::with_details(format!("Failed generating {}", slot), message.clone())
            }
            PlanError::Validation(_) | PlanError::Completion(_) | PlanError::Store(_) => {
                ErrorResponse::with_details(summary, self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_errors_have_no_details() {
        let body = PlanError::InvalidRequest("Missing weekId.".to_string()).to_response("ignored");
        assert_eq!(serde_json::to_value(body).unwrap(), json!({"error": "Missing weekId."}));
    }

    #[test]
    fn slot_failures_name_the_slot() {
        let err = PlanError::SlotGeneration {
            slot: Slot::Dinner,
            message: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "Failed generating dinner: timeout");
        assert_eq!(
            err.to_response("ignored"),
            ErrorResponse::with_details("Failed generating dinner", "timeout")
        );
    }

    #[test]
    fn upstream_failures_use_summary() {
        let err = PlanError::Completion(ApiConnectionError::MissingApiKey("OPENAI_API_KEY".to_string()));
        let body = err.to_response("Could not generate meal plan");
        assert_eq!(body.error, "Could not generate meal plan");
        assert!(body.details.unwrap().contains("OPENAI_API_KEY"));
    }
}
