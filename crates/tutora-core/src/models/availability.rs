//! Weekly availability windows and wall-clock helpers
//!
//! Times are wall-clock `HH:MM` values; days are numbered 0 (Sunday)
//! through 6 (Saturday).

use crate::error::AppError;
use crate::AppResult;
use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Parse a calendar date (`YYYY-MM-DD`)
pub fn parse_date(s: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("invalid date '{}', expected YYYY-MM-DD", s)))
}

/// Parse a wall-clock time (`HH:MM`)
pub fn parse_clock(s: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| AppError::InvalidInput(format!("invalid time '{}', expected HH:MM", s)))
}

/// Format a wall-clock time as `HH:MM`
pub fn format_clock(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Day-of-week index with Sunday = 0
pub fn weekday_index(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

/// Half-open wall-clock interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Build a window, rejecting empty or inverted ranges
    pub fn new(start: NaiveTime, end: NaiveTime) -> AppResult<Self> {
        if end <= start {
            return Err(AppError::InvalidInput(format!(
                "end time {} must be after start time {}",
                format_clock(end),
                format_clock(start)
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `HH:MM` bounds
    pub fn parse(start: &str, end: &str) -> AppResult<Self> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    /// `(s1 < e2) && (s2 < e1)`; touching windows do not overlap
    #[inline]
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    #[inline]
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn label(&self) -> String {
        format!("{}-{}", format_clock(self.start), format_clock(self.end))
    }
}

/// A recurring weekly window in which a teacher accepts bookings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: Uuid,
    pub teacher_id: Uuid,
    /// 0 = Sunday ... 6 = Saturday
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl AvailabilitySlot {
    /// Create a validated slot
    pub fn new(
        teacher_id: Uuid,
        day_of_week: i16,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> AppResult<Self> {
        if !(0..=6).contains(&day_of_week) {
            return Err(AppError::InvalidInput(format!(
                "day_of_week must be between 0 and 6, got {}",
                day_of_week
            )));
        }
        TimeWindow::new(start_time, end_time)?;

        Ok(Self {
            id: Uuid::new_v4(),
            teacher_id,
            day_of_week,
            start_time,
            end_time,
        })
    }

    pub fn window(&self) -> TimeWindow {
        TimeWindow {
            start: self.start_time,
            end: self.end_time,
        }
    }

    /// Whether this single slot fully contains the requested window
    pub fn covers(&self, requested: &TimeWindow) -> bool {
        self.window().contains(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_clock(s).unwrap()
    }

    #[test]
    fn test_parse_clock() {
        assert_eq!(format_clock(t("09:30")), "09:30");
        assert!(parse_clock("9h30").is_err());
        assert!(parse_clock("25:00").is_err());
    }

    #[test]
    fn test_weekday_index_sunday_is_zero() {
        // 2024-01-07 was a Sunday, 2024-01-08 a Monday
        assert_eq!(weekday_index(parse_date("2024-01-07").unwrap()), 0);
        assert_eq!(weekday_index(parse_date("2024-01-08").unwrap()), 1);
        assert_eq!(weekday_index(parse_date("2024-01-13").unwrap()), 6);
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(TimeWindow::parse("10:00", "09:00").is_err());
        assert!(TimeWindow::parse("10:00", "10:00").is_err());
    }

    #[test]
    fn test_half_open_overlap() {
        let a = TimeWindow::parse("09:00", "10:00").unwrap();
        let b = TimeWindow::parse("10:00", "11:00").unwrap();
        let c = TimeWindow::parse("09:30", "10:30").unwrap();

        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn test_slot_covers() {
        let slot = AvailabilitySlot::new(Uuid::new_v4(), 1, t("09:00"), t("17:00")).unwrap();

        assert!(slot.covers(&TimeWindow::parse("09:00", "10:00").unwrap()));
        assert!(slot.covers(&TimeWindow::parse("16:00", "17:00").unwrap()));
        assert!(!slot.covers(&TimeWindow::parse("16:30", "17:30").unwrap()));
    }

    #[test]
    fn test_slot_day_bounds() {
        assert!(AvailabilitySlot::new(Uuid::new_v4(), 7, t("09:00"), t("10:00")).is_err());
        assert!(AvailabilitySlot::new(Uuid::new_v4(), -1, t("09:00"), t("10:00")).is_err());
    }
}
