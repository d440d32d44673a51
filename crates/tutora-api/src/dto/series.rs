//! Series and enrollment DTOs

use super::ensure_positive;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tutora_core::models::{NewSeries, SessionType};
use tutora_core::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSeriesRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,

    pub session_type: SessionType,

    pub subject_id: Option<Uuid>,
    pub level_id: Option<Uuid>,

    /// Length of every session, in hours
    pub duration_hours: Decimal,

    #[serde(default = "default_min_students")]
    #[validate(range(min = 1))]
    pub min_students: i32,

    #[validate(range(min = 1, max = 100))]
    pub max_students: i32,

    pub price: Option<Decimal>,
}

fn default_min_students() -> i32 {
    1
}

impl CreateSeriesRequest {
    pub fn into_input(self) -> Result<NewSeries, AppError> {
        ensure_positive("duration_hours", self.duration_hours)?;
        if let Some(price) = self.price {
            ensure_positive("price", price)?;
        }
        Ok(NewSeries {
            title: self.title.trim().to_string(),
            session_type: self.session_type,
            subject_id: self.subject_id,
            level_id: self.level_id,
            duration_hours: self.duration_hours,
            min_students: self.min_students,
            max_students: self.max_students,
            price: self.price,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InviteStudentsRequest {
    #[validate(length(min = 1, max = 50, message = "Invite between 1 and 50 students"))]
    pub student_ids: Vec<Uuid>,
}

/// Optional body of student-side enrollment calls
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForChildRequest {
    /// Required when a parent acts for a child
    pub for_child_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddSessionsRequest {
    #[validate(length(min = 1, max = 52, message = "Add between 1 and 52 sessions"))]
    pub starts: Vec<DateTime<Utc>>,
}
