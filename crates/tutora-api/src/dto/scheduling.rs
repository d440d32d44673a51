//! Availability, slot check and booking DTOs

use super::{ensure_positive, PaginationParams};
use rust_decimal::Decimal;
use serde::Deserialize;
use tutora_core::models::{BookingStatus, SessionType};
use tutora_core::AppError;
use tutora_services::{AcceptBooking, BookingQuery, NewBooking, SlotInput};
use uuid::Uuid;
use validator::Validate;

/// Replace the caller's weekly availability
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetAvailabilityRequest {
    #[validate(length(max = 42, message = "At most 42 weekly windows"))]
    pub slots: Vec<SlotInput>,
}

/// Advisory check of one slot
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SlotCheckParams {
    #[validate(length(equal = 10, message = "date must be YYYY-MM-DD"))]
    pub date: String,

    #[serde(default)]
    pub session_type: SessionType,

    #[validate(length(equal = 5, message = "start_time must be HH:MM"))]
    pub start_time: String,

    #[validate(length(equal = 5, message = "end_time must be HH:MM"))]
    pub end_time: String,
}

/// Booking request creation
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub teacher_id: Uuid,

    /// Required when a parent books for a child
    pub for_child_id: Option<Uuid>,

    #[serde(default)]
    pub session_type: SessionType,

    pub subject_id: Option<Uuid>,
    pub level_id: Option<Uuid>,

    #[validate(length(equal = 10, message = "requested_date must be YYYY-MM-DD"))]
    pub requested_date: String,

    #[validate(length(equal = 5, message = "start_time must be HH:MM"))]
    pub start_time: String,

    #[validate(length(equal = 5, message = "end_time must be HH:MM"))]
    pub end_time: String,

    #[validate(length(max = 1000))]
    pub message: Option<String>,
}

impl From<CreateBookingRequest> for NewBooking {
    fn from(req: CreateBookingRequest) -> Self {
        NewBooking {
            teacher_id: req.teacher_id,
            for_child_id: req.for_child_id,
            session_type: req.session_type,
            subject_id: req.subject_id,
            level_id: req.level_id,
            requested_date: req.requested_date,
            start_time: req.start_time,
            end_time: req.end_time,
            message: req.message,
        }
    }
}

/// Teacher acceptance of a booking
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct AcceptBookingRequest {
    /// Attach the session to this series instead of merging or creating one
    pub existing_series_id: Option<Uuid>,

    /// Price of a newly created series
    pub price: Option<Decimal>,

    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
}

impl AcceptBookingRequest {
    pub fn into_input(self) -> Result<AcceptBooking, AppError> {
        if let Some(price) = self.price {
            ensure_positive("price", price)?;
        }
        Ok(AcceptBooking {
            existing_series_id: self.existing_series_id,
            price: self.price,
            title: self.title,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeclineBookingRequest {
    #[validate(length(max = 1000))]
    pub reason: String,
}

/// Booking list filters
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookingListParams {
    #[serde(flatten)]
    #[validate(nested)]
    pub pagination: PaginationParams,

    pub status: Option<BookingStatus>,

    /// Parents pick which child to list
    pub student_id: Option<Uuid>,
}

impl BookingListParams {
    pub fn query(&self) -> BookingQuery {
        BookingQuery {
            status: self.status,
            student_id: self.student_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn booking_json() -> serde_json::Value {
        serde_json::json!({
            "teacher_id": Uuid::new_v4(),
            "requested_date": "2030-01-07",
            "start_time": "09:00",
            "end_time": "10:00"
        })
    }

    #[test]
    fn test_booking_defaults_to_individual() {
        let req: CreateBookingRequest = serde_json::from_value(booking_json()).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.session_type, SessionType::Individual);

        let input = NewBooking::from(req);
        assert_eq!(input.requested_date, "2030-01-07");
    }

    #[test]
    fn test_availability_window_limit() {
        let slot = serde_json::json!({ "day_of_week": 1, "start_time": "09:00", "end_time": "12:00" });

        let req: SetAvailabilityRequest =
            serde_json::from_value(serde_json::json!({ "slots": [slot.clone()] })).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.slots[0].start_time, "09:00");

        let req: SetAvailabilityRequest =
            serde_json::from_value(serde_json::json!({ "slots": vec![slot; 43] })).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_booking_rejects_malformed_times() {
        let mut json = booking_json();
        json["start_time"] = serde_json::json!("9h");
        let req: CreateBookingRequest = serde_json::from_value(json).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_accept_rejects_non_positive_price() {
        let req = AcceptBookingRequest {
            price: Some(dec!(0)),
            ..Default::default()
        };
        assert!(matches!(req.into_input(), Err(AppError::Validation(_))));

        let req = AcceptBookingRequest {
            price: Some(dec!(2000)),
            ..Default::default()
        };
        assert_eq!(req.into_input().unwrap().price, Some(dec!(2000)));
    }

    #[test]
    fn test_list_params_from_query_strings() {
        let params: BookingListParams = serde_json::from_value(serde_json::json!({
            "page": "2",
            "per_page": "10",
            "status": "pending"
        }))
        .unwrap();
        assert_eq!(params.pagination.page, 2);
        assert_eq!(params.query().status, Some(BookingStatus::Pending));
    }
}
