//! Repository implementations
//!
//! Each module implements one repository trait from `tutora-core` on
//! [`PgTx`](crate::store::PgTx), decoding rows through private `*Row` structs.
//! Status and type columns are checked against the closed enums; an unknown
//! value is a storage error, never silently defaulted.

pub mod availability_repo;
pub mod booking_repo;
pub mod enrollment_repo;
pub mod series_repo;
pub mod session_repo;
pub mod wallet_repo;

use tutora_core::{AppError, AppResult};

/// Decode a text column into a closed enum
pub(crate) fn decode_enum<T>(
    column: &str,
    value: &str,
    parse: fn(&str) -> Option<T>,
) -> AppResult<T> {
    parse(value).ok_or_else(|| {
        AppError::Database(format!("Unknown {} value in database: '{}'", column, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutora_core::models::BookingStatus;

    #[test]
    fn test_decode_enum_rejects_unknown() {
        assert_eq!(
            decode_enum("status", "accepted", BookingStatus::from_str).unwrap(),
            BookingStatus::Accepted
        );
        assert!(matches!(
            decode_enum("status", "approved", BookingStatus::from_str),
            Err(AppError::Database(_))
        ));
    }
}
