//! Session series model
//!
//! A series is a teacher's recurring (or single) offering: it owns the
//! sessions that get scheduled and the roster of enrollments.

use super::booking::SessionType;
use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Series status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    /// Created, no session scheduled yet
    #[default]
    Draft,
    /// At least one session scheduled
    Active,
    /// Closed by the teacher for downstream reporting
    Finalized,
    Completed,
    Cancelled,
}

impl fmt::Display for SeriesStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesStatus::Draft => write!(f, "draft"),
            SeriesStatus::Active => write!(f, "active"),
            SeriesStatus::Finalized => write!(f, "finalized"),
            SeriesStatus::Completed => write!(f, "completed"),
            SeriesStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl SeriesStatus {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(SeriesStatus::Draft),
            "active" => Some(SeriesStatus::Active),
            "finalized" => Some(SeriesStatus::Finalized),
            "completed" => Some(SeriesStatus::Completed),
            "cancelled" => Some(SeriesStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether students may still join or be invited
    pub fn is_open(&self) -> bool {
        matches!(self, SeriesStatus::Draft | SeriesStatus::Active)
    }
}

/// A teacher's offering with capacity and roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSeries {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub title: String,
    pub session_type: SessionType,
    pub subject_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    /// Length of every session in the series
    pub duration_hours: Decimal,
    pub min_students: i32,
    pub max_students: i32,
    /// Per-student price shown to learners (DZD)
    pub price: Option<Decimal>,
    pub status: SeriesStatus,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new series
#[derive(Debug, Clone)]
pub struct NewSeries {
    pub title: String,
    pub session_type: SessionType,
    pub subject_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    pub duration_hours: Decimal,
    pub min_students: i32,
    pub max_students: i32,
    pub price: Option<Decimal>,
}

impl SessionSeries {
    /// Build a draft series. Individual series are forced to exactly one student.
    pub fn new(teacher_id: Uuid, input: NewSeries, now: DateTime<Utc>) -> AppResult<Self> {
        if input.duration_hours <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "duration_hours must be positive".to_string(),
            ));
        }

        let (min_students, max_students) = match input.session_type {
            SessionType::Individual => (1, 1),
            SessionType::Group => {
                if input.min_students < 1 || input.max_students < input.min_students {
                    return Err(AppError::InvalidInput(format!(
                        "invalid capacity: min {} max {}",
                        input.min_students, input.max_students
                    )));
                }
                (input.min_students, input.max_students)
            }
        };

        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(AppError::InvalidInput("price cannot be negative".to_string()));
            }
        }

        Ok(Self {
            id: Uuid::new_v4(),
            teacher_id,
            title: input.title,
            session_type: input.session_type,
            subject_id: input.subject_id,
            level_id: input.level_id,
            duration_hours: input.duration_hours,
            min_students,
            max_students,
            price: input.price,
            status: SeriesStatus::Draft,
            finalized_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Session length as a chrono duration (rounded to the minute)
    pub fn session_duration(&self) -> Duration {
        let minutes = (self.duration_hours * Decimal::from(60))
            .round()
            .to_i64()
            .unwrap_or(60);
        Duration::minutes(minutes)
    }

    /// Fails with `InvalidStatus` when the series no longer takes members
    pub fn ensure_open(&self) -> AppResult<()> {
        if self.status.is_open() {
            Ok(())
        } else {
            Err(AppError::InvalidStatus(format!(
                "series {} is {}",
                self.id, self.status
            )))
        }
    }

    /// Fails with `SeriesFull` when `enrolled` already reaches capacity
    pub fn ensure_capacity(&self, enrolled: i64, joining: i64) -> AppResult<()> {
        if enrolled + joining > i64::from(self.max_students) {
            Err(AppError::SeriesFull {
                current: enrolled,
                max: self.max_students,
            })
        } else {
            Ok(())
        }
    }

    /// Offering equality; two absent offerings are treated as the same
    pub fn same_offering(&self, subject_id: Option<Uuid>, level_id: Option<Uuid>) -> bool {
        self.subject_id == subject_id && self.level_id == level_id
    }

    pub fn is_finalized(&self) -> bool {
        self.status == SeriesStatus::Finalized
    }
}

/// Series with roster and schedule counters
#[derive(Debug, Clone, Serialize)]
pub struct SeriesSummary {
    #[serde(flatten)]
    pub series: SessionSeries,
    pub enrolled_count: i64,
    /// Join requests awaiting the teacher
    pub pending_count: i64,
    pub invited_count: i64,
    pub session_count: i64,
}
