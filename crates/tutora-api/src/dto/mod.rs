//! Data Transfer Objects (DTOs) for API requests and responses
//!
//! Responses reuse the domain types, which already serialize; only request
//! bodies and query strings live here.

pub mod common;
pub mod scheduling;
pub mod series;
pub mod wallet;

pub use common::*;
pub use scheduling::*;
pub use series::*;
pub use wallet::*;

use rust_decimal::Decimal;
use tutora_core::AppError;

/// Reject zero and negative money amounts
pub(crate) fn ensure_positive(field: &str, value: Decimal) -> Result<(), AppError> {
    if value <= Decimal::ZERO {
        return Err(AppError::Validation(format!("{} must be positive", field)));
    }
    Ok(())
}
