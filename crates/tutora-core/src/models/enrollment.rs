//! Enrollment model and its state machine
//!
//! ```text
//! invited   --> accepted | declined
//! requested --> accepted | declined
//! accepted  --> removed
//! ```
//!
//! `declined` and `removed` are terminal. A terminal row may be reopened as a
//! fresh invitation or request, because (series, student) is unique.

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Who started the enrollment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitiatedBy {
    Teacher,
    Student,
}

impl fmt::Display for InitiatedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitiatedBy::Teacher => write!(f, "teacher"),
            InitiatedBy::Student => write!(f, "student"),
        }
    }
}

impl InitiatedBy {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "teacher" => Some(InitiatedBy::Teacher),
            "student" => Some(InitiatedBy::Student),
            _ => None,
        }
    }
}

/// Enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Invited,
    Requested,
    Accepted,
    Declined,
    Removed,
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrollmentStatus::Invited => write!(f, "invited"),
            EnrollmentStatus::Requested => write!(f, "requested"),
            EnrollmentStatus::Accepted => write!(f, "accepted"),
            EnrollmentStatus::Declined => write!(f, "declined"),
            EnrollmentStatus::Removed => write!(f, "removed"),
        }
    }
}

impl EnrollmentStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "invited" => Some(EnrollmentStatus::Invited),
            "requested" => Some(EnrollmentStatus::Requested),
            "accepted" => Some(EnrollmentStatus::Accepted),
            "declined" => Some(EnrollmentStatus::Declined),
            "removed" => Some(EnrollmentStatus::Removed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentStatus::Declined | EnrollmentStatus::Removed)
    }

    /// Edges of the enrollment state machine
    pub fn can_transition_to(&self, next: EnrollmentStatus) -> bool {
        use EnrollmentStatus::*;
        matches!(
            (self, next),
            (Invited, Accepted)
                | (Invited, Declined)
                | (Requested, Accepted)
                | (Requested, Declined)
                | (Accepted, Removed)
        )
    }
}

/// A student's membership record in a series; the billable unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: Uuid,
    pub series_id: Uuid,
    pub student_id: Uuid,
    pub initiated_by: InitiatedBy,
    pub status: EnrollmentStatus,
    pub requested_at: Option<DateTime<Utc>>,
    pub invited_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub declined_at: Option<DateTime<Utc>>,
    pub removed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    fn blank(series_id: Uuid, student_id: Uuid, initiated_by: InitiatedBy, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            series_id,
            student_id,
            initiated_by,
            status: EnrollmentStatus::Requested,
            requested_at: None,
            invited_at: None,
            accepted_at: None,
            declined_at: None,
            removed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Student-initiated join request
    pub fn requested(series_id: Uuid, student_id: Uuid, now: DateTime<Utc>) -> Self {
        let mut e = Self::blank(series_id, student_id, InitiatedBy::Student, now);
        e.status = EnrollmentStatus::Requested;
        e.requested_at = Some(now);
        e
    }

    /// Teacher-initiated invitation
    pub fn invited(series_id: Uuid, student_id: Uuid, now: DateTime<Utc>) -> Self {
        let mut e = Self::blank(series_id, student_id, InitiatedBy::Teacher, now);
        e.status = EnrollmentStatus::Invited;
        e.invited_at = Some(now);
        e
    }

    /// Move along one edge of the state machine, stamping the matching timestamp
    pub fn transition(&mut self, next: EnrollmentStatus, now: DateTime<Utc>) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidStatus(format!(
                "enrollment {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        match next {
            EnrollmentStatus::Accepted => self.accepted_at = Some(now),
            EnrollmentStatus::Declined => self.declined_at = Some(now),
            EnrollmentStatus::Removed => self.removed_at = Some(now),
            EnrollmentStatus::Invited | EnrollmentStatus::Requested => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Restart a terminal enrollment as a new invitation or request
    pub fn reopen(&mut self, initiated_by: InitiatedBy, now: DateTime<Utc>) -> AppResult<()> {
        if !self.status.is_terminal() {
            return Err(AppError::InvalidStatus(format!(
                "enrollment {} is {}, only declined or removed enrollments can be reopened",
                self.id, self.status
            )));
        }

        self.initiated_by = initiated_by;
        self.accepted_at = None;
        self.declined_at = None;
        self.removed_at = None;
        match initiated_by {
            InitiatedBy::Student => {
                self.status = EnrollmentStatus::Requested;
                self.requested_at = Some(now);
            }
            InitiatedBy::Teacher => {
                self.status = EnrollmentStatus::Invited;
                self.invited_at = Some(now);
            }
        }
        self.updated_at = now;
        Ok(())
    }
}
