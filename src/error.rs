// 🚦 Error taxonomy + response envelope
//
// Every backend call settles into one of two JSON shapes:
//   success: { "data": ..., "message": "..." }
//   failure: { "category": "...", "message": "...", "details": ... }

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// ERROR CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Permission,
    NotFound,
    Database,
    Server,
    Network,
    Storage,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Permission => "permission",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Database => "database",
            ErrorCategory::Server => "server",
            ErrorCategory::Network => "network",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Worth one more attempt on a read
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Server | ErrorCategory::Database
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SERVICE ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("{category}: {message}")]
pub struct ServiceError {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        ServiceError {
            category,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Database, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Server, message)
    }

    pub fn is_transient(&self) -> bool {
        self.category.is_transient()
    }

    /// Lock poisoning means a writer panicked mid-update
    pub(crate) fn poisoned(what: &str) -> Self {
        Self::server(format!("{} lock poisoned", what))
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ServiceError::validation(err.to_string())
            }
            rusqlite::Error::QueryReturnedNoRows => ServiceError::not_found(err.to_string()),
            _ => ServiceError::database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::server(format!("Malformed record: {}", err))
    }
}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// The `{data, message}` / `{category, message, details?}` envelope.
/// Failure is listed first so an untagged decode never mistakes an error body
/// for a success payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiResponse<T> {
    Failure(ServiceError),
    Success { data: T, message: String },
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        ApiResponse::Success {
            data,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResponse::Success { .. })
    }

    pub fn into_result(self) -> ServiceResult<T> {
        match self {
            ApiResponse::Success { data, .. } => Ok(data),
            ApiResponse::Failure(err) => Err(err),
        }
    }
}

impl<T> From<ServiceError> for ApiResponse<T> {
    fn from(err: ServiceError) -> Self {
        ApiResponse::Failure(err)
    }
}
