use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Category of a failed workflow operation, used by callers to decide how to
/// present the failure (inline field errors, banner, retry button, re-login).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Local form errors. Never produced by the network.
    Validation,
    /// Backend rejected the payload (400/422).
    BadRequest,
    Auth,
    Permission,
    NotFound,
    Conflict,
    RateLimit,
    ServerError,
    ServiceUnavailable,
    Network,
    Unknown,
}

impl ErrorCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 422 => ErrorCategory::BadRequest,
            401 => ErrorCategory::Auth,
            403 => ErrorCategory::Permission,
            404 => ErrorCategory::NotFound,
            409 => ErrorCategory::Conflict,
            429 => ErrorCategory::RateLimit,
            502..=504 => ErrorCategory::ServiceUnavailable,
            500..=599 => ErrorCategory::ServerError,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::BadRequest => "bad_request",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Permission => "permission",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::ServiceUnavailable => "service_unavailable",
            ErrorCategory::Network => "network",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Message shown when the backend did not send one.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "Please correct the highlighted fields.",
            ErrorCategory::BadRequest => "Invalid request. Please check your input.",
            ErrorCategory::Auth => "Authentication required. Please log in again.",
            ErrorCategory::Permission => "You do not have permission to perform this action.",
            ErrorCategory::NotFound => "The requested resource was not found.",
            ErrorCategory::Conflict => "A conflict occurred. The resource may already exist.",
            ErrorCategory::RateLimit => "Too many requests. Please try again later.",
            ErrorCategory::ServerError => "Internal server error. Please try again later.",
            ErrorCategory::ServiceUnavailable => {
                "Service temporarily unavailable. Please try again later."
            }
            ErrorCategory::Network => "Network error. Please check your internet connection.",
            ErrorCategory::Unknown => "An unexpected error occurred.",
        }
    }

    /// Categories for which a manual "Retry" re-issues the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::ServerError | ErrorCategory::ServiceUnavailable
        )
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
