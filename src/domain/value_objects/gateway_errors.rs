use thiserror::Error;

use crate::domain::value_objects::enums::error_categories::ErrorCategory;

/// Failure returned by every gateway call: a non-2xx answer or a transport error.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct GatewayError {
    pub category: ErrorCategory,
    pub message: String,
    pub status: Option<u16>,
    /// Raw error body returned by the backend, when it was JSON.
    pub details: Option<serde_json::Value>,
}

impl GatewayError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Builds an error from an HTTP status, keeping the backend's message when
    /// it sent one and falling back to the category's default otherwise.
    pub fn from_status(
        status: u16,
        backend_message: Option<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        let category = ErrorCategory::from_status(status);
        let message = backend_message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| match category {
                ErrorCategory::Unknown => format!("Request failed with status {status}"),
                _ => category.default_message().to_string(),
            });

        Self {
            category,
            message,
            status: Some(status),
            details,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }
}
