// Error handling types for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::error;

use super::validation::ValidationResult;
use crate::store::StoreError;

/// API error taxonomy. Business-rule violations carry an explicit
/// code/message/status and propagate unchanged to the boundary; unexpected
/// lower-level failures are wrapped into `Store`/`Technical` and surfaced
/// with a generic message only.
#[derive(Debug)]
pub enum ApiError {
    MissingToken,
    ExpiredToken,
    InvalidToken,
    Forbidden,
    NotFound(String),
    UserNotFound(String),
    AlreadyExists(String),
    AuthFailed,
    UserBlocked,
    AlreadyVerified,
    DuplicateVerify,
    InvalidParams(String),
    NotCreated(String),
    FailedUpdate,
    Store(StoreError),
    Technical(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::MissingToken => write!(f, "Missing Token"),
            ApiError::ExpiredToken => write!(f, "Expired Token"),
            ApiError::InvalidToken => write!(f, "Invalid Token"),
            ApiError::Forbidden => write!(f, "Forbidden"),
            ApiError::NotFound(what) => write!(f, "Not Found: {}", what),
            ApiError::UserNotFound(what) => write!(f, "User Not Found: {}", what),
            ApiError::AlreadyExists(what) => write!(f, "Already Exists: {}", what),
            ApiError::AuthFailed => write!(f, "Authentication Failed"),
            ApiError::UserBlocked => write!(f, "User Blocked"),
            ApiError::AlreadyVerified => write!(f, "Already Verified"),
            ApiError::DuplicateVerify => write!(f, "Duplicate Verification Request"),
            ApiError::InvalidParams(msg) => write!(f, "Invalid Params: {}", msg),
            ApiError::NotCreated(what) => write!(f, "Not Created: {}", what),
            ApiError::FailedUpdate => write!(f, "Failed Update"),
            ApiError::Store(e) => write!(f, "Store Error: {}", e),
            ApiError::Technical(msg) => write!(f, "Technical Error: {}", msg),
        }
    }
}

const GENERIC_MESSAGE: &str = "Something went wrong. Please try again or contact support";

/// JSON error response envelope
#[derive(Serialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Maps the error to its HTTP status, machine code, and user-facing
    /// message. Internal detail never leaks into the message.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            ApiError::MissingToken => (
                StatusCode::BAD_REQUEST,
                "ERROR_MISSING_TOKEN",
                "You need to be logged in to continue. Please log in again".to_string(),
            ),
            ApiError::ExpiredToken => (
                StatusCode::BAD_REQUEST,
                "ERROR_EXPIRED_TOKEN",
                "Your session has expired. Please log in again".to_string(),
            ),
            ApiError::InvalidToken => (
                StatusCode::BAD_REQUEST,
                "ERROR_INVALID_TOKEN",
                "You provided an invalid token".to_string(),
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "ERROR_FORBIDDEN",
                "You don't have sufficient permission to access that resource".to_string(),
            ),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "ERROR_NOT_FOUND",
                format!("Sorry, we could not find {}.", what),
            ),
            ApiError::UserNotFound(what) => (
                StatusCode::NOT_FOUND,
                "ERROR_USER_NOT_FOUND",
                format!("Sorry, we could not find {}.", what),
            ),
            ApiError::AlreadyExists(what) => (
                StatusCode::CONFLICT,
                "ERROR_ALREADY_EXISTS",
                format!("The {} already exists.", what),
            ),
            ApiError::AuthFailed => (
                StatusCode::BAD_REQUEST,
                "ERROR_FAILED_AUTH",
                "There was a problem trying to authenticate you".to_string(),
            ),
            ApiError::UserBlocked => (
                StatusCode::BAD_REQUEST,
                "ERROR_USER_BLOCKED",
                "Your account has been blocked. Please contact support".to_string(),
            ),
            ApiError::AlreadyVerified => (
                StatusCode::BAD_REQUEST,
                "ERROR_ALREADY_VERIFIED",
                "Looks like your account has already been confirmed".to_string(),
            ),
            ApiError::DuplicateVerify => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ERROR_DUPLICATE_VERIFY",
                "A verification email has already been sent to your email address".to_string(),
            ),
            ApiError::InvalidParams(msg) => (
                StatusCode::BAD_REQUEST,
                "ERROR_INVALID_PARAMS",
                msg.clone(),
            ),
            ApiError::NotCreated(what) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERROR_NOT_CREATED",
                format!(
                    "The {} was not created for some reason. Please try again",
                    what
                ),
            ),
            ApiError::FailedUpdate => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ERROR_FAILED_UPDATE",
                "An error occurred while updating. Please try again".to_string(),
            ),
            ApiError::Store(e) => {
                error!(error = %e, "Store error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ERROR_TECHNICAL",
                    GENERIC_MESSAGE.to_string(),
                )
            }
            ApiError::Technical(msg) => {
                error!(error = %msg, "Technical error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ERROR_TECHNICAL",
                    GENERIC_MESSAGE.to_string(),
                )
            }
        }
    }

    /// Machine code for this error, as surfaced in the response envelope.
    pub fn code(&self) -> &'static str {
        self.parts().1
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = self.parts();

        let error_response = ErrorResponse {
            status: "error".to_string(),
            code: code.to_string(),
            message,
        };

        (status, Json(error_response)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Store(e)
    }
}

/// Converts a failed validation into an `InvalidParams` error carrying the
/// field-level messages.
impl From<ValidationResult> for ApiError {
    fn from(result: ValidationResult) -> Self {
        if result.is_valid {
            ApiError::Technical("Validation result was valid but converted to error".to_string())
        } else {
            ApiError::InvalidParams(result.field_errors().join(", "))
        }
    }
}
