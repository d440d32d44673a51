//! Booking request model
//!
//! A student (or a parent on behalf of a verified child) asks a teacher for a
//! one-off slot. Pending requests never reserve the slot; the teacher's
//! acceptance decides which request wins.

use super::availability::{format_clock, TimeWindow};
use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of session a booking or series delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    /// One teacher, one student
    #[default]
    Individual,
    /// One teacher, several students sharing the session
    Group,
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionType::Individual => write!(f, "individual"),
            SessionType::Group => write!(f, "group"),
        }
    }
}

impl SessionType {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "individual" => Some(SessionType::Individual),
            "group" => Some(SessionType::Group),
            _ => None,
        }
    }
}

/// Booking request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Cancelled,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Accepted => write!(f, "accepted"),
            BookingStatus::Declined => write!(f, "declined"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl BookingStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(BookingStatus::Pending),
            "accepted" => Some(BookingStatus::Accepted),
            "declined" => Some(BookingStatus::Declined),
            "cancelled" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Pending)
    }
}

/// A request for a one-off slot with a teacher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub teacher_id: Uuid,
    /// Set when a parent booked for their child
    pub booked_by_parent_id: Option<Uuid>,
    pub session_type: SessionType,
    pub subject_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    pub requested_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub message: Option<String>,
    pub status: BookingStatus,
    pub decline_reason: Option<String>,
    /// Stamped on acceptance
    pub session_id: Option<Uuid>,
    /// Stamped on acceptance
    pub series_id: Option<Uuid>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRequest {
    /// Window of the request on its date
    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Fails with `InvalidStatus` unless the booking is still pending
    pub fn ensure_pending(&self) -> AppResult<()> {
        if self.status == BookingStatus::Pending {
            Ok(())
        } else {
            Err(AppError::InvalidStatus(format!(
                "booking {} is {}, expected pending",
                self.id, self.status
            )))
        }
    }

    pub fn accept(&mut self, session_id: Uuid, series_id: Uuid, now: DateTime<Utc>) {
        self.status = BookingStatus::Accepted;
        self.session_id = Some(session_id);
        self.series_id = Some(series_id);
        self.responded_at = Some(now);
        self.updated_at = now;
    }

    pub fn decline(&mut self, reason: String, now: DateTime<Utc>) {
        self.status = BookingStatus::Declined;
        self.decline_reason = Some(reason);
        self.responded_at = Some(now);
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = BookingStatus::Cancelled;
        self.updated_at = now;
    }

    /// Human readable slot, e.g. `2024-01-08 09:00-10:00`
    pub fn slot_label(&self) -> String {
        format!(
            "{} {}-{}",
            self.requested_date,
            format_clock(self.start_time),
            format_clock(self.end_time)
        )
    }
}

/// Filter for booking listings
#[derive(Debug, Clone, Default)]
pub struct BookingFilter {
    pub teacher_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub limit: i64,
    pub offset: i64,
}
