//! Unified error handling for Tutora
//!
//! Every failure the scheduling and ledger core can produce is a variant of
//! [`AppError`]. Callers match on variants, never on message text; only the
//! HTTP boundary turns them into status codes (see the `ResponseError` impl).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Authentication Errors ====================
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    // ==================== Scheduling Errors ====================
    #[error("Slot not available: {message}")]
    SlotNotAvailable {
        message: String,
        available_slots: Vec<String>,
    },

    #[error("Already booked: {0}")]
    AlreadyBooked(String),

    #[error("Time conflict: {0}")]
    TimeConflict(String),

    #[error("Session is full: {current}/{max} participants")]
    SessionFull { current: i64, max: i32 },

    #[error("Series is full: {current}/{max} students enrolled")]
    SeriesFull { current: i64, max: i32 },

    #[error("Already requested: {0}")]
    AlreadyRequested(String),

    // ==================== Ledger Errors ====================
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("Already processed: {0}")]
    AlreadyProcessed(String),

    #[error("Refund not eligible: {0}")]
    RefundNotEligible(String),

    // ==================== External Service Errors ====================
    #[error("Room provisioning failed, retry join: {0}")]
    RoomProvisioning(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthenticated(_) | AppError::InvalidToken(_) | AppError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }

            // 402 Payment Required
            AppError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,

            // 403 Forbidden
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::InvalidStatus(_)
            | AppError::SlotNotAvailable { .. }
            | AppError::AlreadyBooked(_)
            | AppError::TimeConflict(_)
            | AppError::SessionFull { .. }
            | AppError::SeriesFull { .. }
            | AppError::AlreadyRequested(_)
            | AppError::AlreadyProcessed(_)
            | AppError::RefundNotEligible(_) => StatusCode::CONFLICT,

            // 502 Bad Gateway
            AppError::RoomProvisioning(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::TokenExpired => "token_expired",
            AppError::InvalidToken(_) => "invalid_token",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::InvalidStatus(_) => "invalid_status",
            AppError::SlotNotAvailable { .. } => "slot_not_available",
            AppError::AlreadyBooked(_) => "already_booked",
            AppError::TimeConflict(_) => "time_conflict",
            AppError::SessionFull { .. } => "session_full",
            AppError::SeriesFull { .. } => "series_full",
            AppError::AlreadyRequested(_) => "already_requested",
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::AlreadyProcessed(_) => "already_processed",
            AppError::RefundNotEligible(_) => "refund_not_eligible",
            AppError::RoomProvisioning(_) => "room_provisioning_failed",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the error is a storage or programming fault rather than a
    /// domain outcome. Internal errors never leak their detail to callers.
    pub fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }

    /// True for the scheduling conflict family (availability, overlap,
    /// session type mismatch, capacity).
    pub fn is_slot_conflict(&self) -> bool {
        matches!(
            self,
            AppError::SlotNotAvailable { .. }
                | AppError::AlreadyBooked(_)
                | AppError::TimeConflict(_)
                | AppError::SessionFull { .. }
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        let message = if self.is_internal() {
            tracing::error!(error = %self, "Internal error surfaced at API boundary");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut body = json!({
            "error": self.error_code(),
            "message": message,
            "status": status.as_u16(),
        });

        match self {
            AppError::SlotNotAvailable {
                available_slots, ..
            } => {
                body["available_slots"] = json!(available_slots);
            }
            AppError::SessionFull { current, max } | AppError::SeriesFull { current, max } => {
                body["current"] = json!(current);
                body["max"] = json!(max);
            }
            _ => {}
        }

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
