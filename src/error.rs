/// Unified error types for the Inkstream backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why an account is refused access to an operation.
///
/// Each guard failure carries its own reason so callers (and tests) can tell
/// them apart; they are never collapsed into a generic "rejected".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionReason {
    /// The deletion grace period is running for this account
    PendingDeletion,
    /// An administrator locked the account
    Locked,
    /// An administrator banned the account; blocks write actions, not login
    Banned,
    /// The account was deactivated and must be reactivated first
    Inactive,
    /// Too many consecutive failed logins
    LoginLocked { hours_remaining: i64 },
}

impl RestrictionReason {
    /// Stable machine-readable code used in HTTP error bodies
    pub fn error_code(&self) -> &'static str {
        match self {
            RestrictionReason::PendingDeletion => "AccountPendingDeletion",
            RestrictionReason::Locked => "AccountLocked",
            RestrictionReason::Banned => "AccountBanned",
            RestrictionReason::Inactive => "AccountInactive",
            RestrictionReason::LoginLocked { .. } => "LoginAttemptsBlocked",
        }
    }
}

impl fmt::Display for RestrictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestrictionReason::PendingDeletion => {
                write!(f, "Account is scheduled for deletion")
            }
            RestrictionReason::Locked => {
                write!(f, "Account has been locked by an administrator")
            }
            RestrictionReason::Banned => {
                write!(f, "Account is banned and cannot perform this action")
            }
            RestrictionReason::Inactive => write!(f, "Account is deactivated"),
            RestrictionReason::LoginLocked { hours_remaining } => write!(
                f,
                "Too many failed login attempts, try again in {} hour(s)",
                hours_remaining
            ),
        }
    }
}

/// Main error type for the backend
#[derive(Error, Debug)]
pub enum AppError {
    /// Supplied sensitive-action token is missing, mismatched, or past expiry
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// Attempt budget exhausted and the window has not elapsed yet
    #[error("Too many requests for this action")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// A state guard short-circuited the operation
    #[error("{reason}")]
    AccountRestricted { reason: RestrictionReason },

    /// Wrong password or unknown email; deliberately indistinguishable
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Authorization errors
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email, duplicate job key)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn restricted(reason: RestrictionReason) -> Self {
        AppError::AccountRestricted { reason }
    }
}

/// JSON error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Convert AppError to HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::InvalidOrExpiredToken => {
                (StatusCode::BAD_REQUEST, "InvalidToken", self.to_string())
            }
            AppError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                self.to_string(),
            ),
            AppError::AccountRestricted { reason } => {
                let status = match reason {
                    RestrictionReason::Inactive => StatusCode::UNAUTHORIZED,
                    RestrictionReason::LoginLocked { .. } => StatusCode::TOO_MANY_REQUESTS,
                    _ => StatusCode::FORBIDDEN,
                };
                (status, reason.error_code(), reason.to_string())
            }
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "InvalidCredentials",
                self.to_string(),
            ),
            AppError::Authorization(_) => {
                (StatusCode::FORBIDDEN, "Forbidden", self.to_string())
            }
            AppError::Validation(_) => {
                (StatusCode::BAD_REQUEST, "InvalidRequest", self.to_string())
            }
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string()),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "Conflict", self.to_string()),
            AppError::Jwt(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                "Invalid or expired session".to_string(),
            ),
            AppError::Database(_) | AppError::Internal(_) | AppError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
            ),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: error_code.to_string(),
                message,
            }),
        )
            .into_response();

        if let AppError::RateLimitExceeded { retry_after } = &self {
            if let Ok(value) = retry_after.as_secs().to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

/// Result type alias for backend operations
pub type AppResult<T> = Result<T, AppError>;
