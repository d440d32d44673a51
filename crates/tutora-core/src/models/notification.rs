//! Notification model
//!
//! Notifications are produced by core operations and dispatched after the
//! owning transaction commits. Delivery is best-effort.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// What happened, from the recipient's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingCreated,
    BookingAccepted,
    BookingDeclined,
    BookingCancelled,
    SeriesInvitation,
    JoinRequest,
    EnrollmentAccepted,
    EnrollmentDeclined,
    EnrollmentRemoved,
    PurchaseApproved,
    PurchaseRejected,
    SessionStarted,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::BookingCreated => "booking_created",
            NotificationKind::BookingAccepted => "booking_accepted",
            NotificationKind::BookingDeclined => "booking_declined",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::SeriesInvitation => "series_invitation",
            NotificationKind::JoinRequest => "join_request",
            NotificationKind::EnrollmentAccepted => "enrollment_accepted",
            NotificationKind::EnrollmentDeclined => "enrollment_declined",
            NotificationKind::EnrollmentRemoved => "enrollment_removed",
            NotificationKind::PurchaseApproved => "purchase_approved",
            NotificationKind::PurchaseRejected => "purchase_rejected",
            NotificationKind::SessionStarted => "session_started",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    /// Ids the client needs to deep-link (booking, series, session...)
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            user_id,
            kind,
            title: title.into(),
            body: body.into(),
            data,
            created_at: Utc::now(),
        }
    }
}
