//! Session model
//!
//! A dated occurrence, either standalone or member #N of a series.

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Live,
    Completed,
    Cancelled,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Scheduled => write!(f, "scheduled"),
            SessionStatus::Live => write!(f, "live"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl SessionStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(SessionStatus::Scheduled),
            "live" => Some(SessionStatus::Live),
            "completed" => Some(SessionStatus::Completed),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }

    /// Occupies the teacher's time slot
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::Live)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub series_id: Option<Uuid>,
    pub teacher_id: Uuid,
    /// 1-based position inside the series
    pub session_number: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_participants: i32,
    pub status: SessionStatus,
    pub actual_start: Option<DateTime<Utc>>,
    pub actual_end: Option<DateTime<Utc>>,
    /// Video room, provisioned lazily after the session goes live
    pub room_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn scheduled(
        series_id: Option<Uuid>,
        teacher_id: Uuid,
        session_number: i32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        max_participants: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            series_id,
            teacher_id,
            session_number,
            start_time,
            end_time,
            max_participants,
            status: SessionStatus::Scheduled,
            actual_start: None,
            actual_end: None,
            room_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Once true for any session of a series, its stars are no longer refundable
    pub fn has_started(&self) -> bool {
        matches!(self.status, SessionStatus::Live | SessionStatus::Completed)
            || self.actual_start.is_some()
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != SessionStatus::Scheduled {
            return Err(AppError::InvalidStatus(format!(
                "session {} is {}, expected scheduled",
                self.id, self.status
            )));
        }
        self.status = SessionStatus::Live;
        self.actual_start = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != SessionStatus::Live {
            return Err(AppError::InvalidStatus(format!(
                "session {} is {}, expected live",
                self.id, self.status
            )));
        }
        self.status = SessionStatus::Completed;
        self.actual_end = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status != SessionStatus::Scheduled {
            return Err(AppError::InvalidStatus(format!(
                "session {} is {}, only scheduled sessions can be cancelled",
                self.id, self.status
            )));
        }
        self.status = SessionStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session() -> Session {
        let now = Utc::now();
        Session::scheduled(None, Uuid::new_v4(), 1, now, now + Duration::hours(1), 1, now)
    }

    #[test]
    fn test_lifecycle() {
        let mut s = session();
        assert!(!s.has_started());

        s.start(Utc::now()).unwrap();
        assert_eq!(s.status, SessionStatus::Live);
        assert!(s.has_started());

        s.complete(Utc::now()).unwrap();
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.actual_end.is_some());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut s = session();
        assert!(s.complete(Utc::now()).is_err());

        s.start(Utc::now()).unwrap();
        assert!(s.cancel(Utc::now()).is_err());
        assert!(s.start(Utc::now()).is_err());
    }

    #[test]
    fn test_actual_start_marks_started() {
        let mut s = session();
        s.actual_start = Some(Utc::now());
        assert!(s.has_started());
    }
}
