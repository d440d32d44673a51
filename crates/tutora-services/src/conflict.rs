//! Availability and conflict resolution
//!
//! A requested window is bookable when one availability slot on that weekday
//! fully contains it and no accepted booking of the teacher blocks it:
//!
//! - an individual request is blocked by any overlapping accepted booking
//! - a group request is blocked only by an overlapping accepted individual
//!   booking; overlapping group bookings are merge candidates at accept time
//!
//! The check at creation is advisory. Pending requests reserve nothing, so
//! acceptance runs [`check_overlap`] and [`merge_decision`] again inside its
//! own transaction.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};
use tutora_core::models::{
    availability::{parse_date, weekday_index},
    AvailabilitySlot, BookingRequest, SessionType, TimeWindow,
};
use tutora_core::traits::{Store, StoreTx};
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

/// Absolute instants of a wall-clock window on a date in the teacher's zone
pub fn slot_instants(
    date: NaiveDate,
    window: &TimeWindow,
    tz: &Tz,
) -> AppResult<(DateTime<Utc>, DateTime<Utc>)> {
    let resolve = |time: NaiveTime| {
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "{} {} does not exist in {}",
                    date,
                    time,
                    tz.name()
                ))
            })
    };
    Ok((resolve(window.start)?, resolve(window.end)?))
}

/// First slot that contains the whole window; windows are never stitched
/// together across adjacent slots
pub fn covering_slot<'a>(
    slots: &'a [AvailabilitySlot],
    window: &TimeWindow,
) -> Option<&'a AvailabilitySlot> {
    slots.iter().find(|slot| slot.covers(window))
}

/// First accepted booking that blocks a request of `session_type` at `window`
pub fn find_overlap<'a>(
    accepted: &'a [BookingRequest],
    session_type: SessionType,
    window: &TimeWindow,
) -> Option<&'a BookingRequest> {
    accepted.iter().find(|booking| {
        booking.window().overlaps(window)
            && (session_type == SessionType::Individual
                || booking.session_type == SessionType::Individual)
    })
}

/// Whether a request may share an active session found at its exact window
pub fn merge_decision(
    requested: SessionType,
    existing: SessionType,
    offering_matches: bool,
    participants: i64,
    max_participants: i32,
) -> AppResult<()> {
    if existing == SessionType::Individual {
        return Err(AppError::TimeConflict(
            "already have an individual session at this time".to_string(),
        ));
    }
    if requested == SessionType::Individual {
        return Err(AppError::TimeConflict(
            "a group session already occupies this time".to_string(),
        ));
    }
    if !offering_matches {
        return Err(AppError::TimeConflict(
            "a group session for a different subject or level already occupies this time"
                .to_string(),
        ));
    }
    if participants >= i64::from(max_participants) {
        return Err(AppError::SessionFull {
            current: participants,
            max: max_participants,
        });
    }
    Ok(())
}

/// Availability half of the check
pub async fn check_availability<T: StoreTx>(
    tx: &mut T,
    teacher_id: Uuid,
    date: NaiveDate,
    window: &TimeWindow,
) -> AppResult<()> {
    let slots = tx.slots_for_day(teacher_id, weekday_index(date)).await?;
    if covering_slot(&slots, window).is_some() {
        return Ok(());
    }

    Err(AppError::SlotNotAvailable {
        message: format!(
            "{} {} is outside the teacher's availability",
            date,
            window.label()
        ),
        available_slots: slots.iter().map(|s| s.window().label()).collect(),
    })
}

/// Overlap half of the check, against accepted bookings on the same date
pub async fn check_overlap<T: StoreTx>(
    tx: &mut T,
    teacher_id: Uuid,
    date: NaiveDate,
    session_type: SessionType,
    window: &TimeWindow,
) -> AppResult<()> {
    let accepted = tx.accepted_bookings_on(teacher_id, date).await?;
    match find_overlap(&accepted, session_type, window) {
        Some(blocking) => Err(AppError::AlreadyBooked(format!(
            "overlaps the accepted {} booking at {}",
            blocking.session_type,
            blocking.slot_label()
        ))),
        None => Ok(()),
    }
}

/// Full check inside an open transaction
pub async fn check_slot<T: StoreTx>(
    tx: &mut T,
    teacher_id: Uuid,
    date: NaiveDate,
    session_type: SessionType,
    window: &TimeWindow,
) -> AppResult<()> {
    check_availability(tx, teacher_id, date, window).await?;
    check_overlap(tx, teacher_id, date, session_type, window).await
}

/// Result of an advisory slot check
#[derive(Debug, Clone, Serialize)]
pub struct SlotCheck {
    pub ok: bool,
    /// Error code of the blocking condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Teacher's windows on the requested weekday, when availability failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_slots: Vec<String>,
}

impl SlotCheck {
    fn ok() -> Self {
        Self {
            ok: true,
            code: None,
            reason: None,
            available_slots: Vec::new(),
        }
    }

    fn rejected(err: AppError) -> Self {
        let code = Some(err.error_code());
        let reason = Some(err.to_string());
        let available_slots = match err {
            AppError::SlotNotAvailable {
                available_slots, ..
            } => available_slots,
            _ => Vec::new(),
        };
        Self {
            ok: false,
            code,
            reason,
            available_slots,
        }
    }
}

/// Read-only slot checker
pub struct ConflictResolver<S: Store> {
    store: Arc<S>,
    tz: Tz,
}

impl<S: Store> ConflictResolver<S> {
    pub fn new(store: Arc<S>, tz: Tz) -> Self {
        Self { store, tz }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Check a request given as `YYYY-MM-DD` and `HH:MM` strings
    ///
    /// Malformed input is an error; a blocked slot is a negative [`SlotCheck`].
    #[instrument(skip(self))]
    pub async fn check(
        &self,
        teacher_id: Uuid,
        date: &str,
        session_type: SessionType,
        start: &str,
        end: &str,
    ) -> AppResult<SlotCheck> {
        let date = parse_date(date)?;
        let window = TimeWindow::parse(start, end)?;
        slot_instants(date, &window, &self.tz)?;

        let mut tx = self.store.begin().await?;
        match check_slot(&mut tx, teacher_id, date, session_type, &window).await {
            Ok(()) => Ok(SlotCheck::ok()),
            Err(e) if e.is_slot_conflict() => {
                debug!("Slot {} {} rejected: {}", date, window.label(), e);
                Ok(SlotCheck::rejected(e))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tutora_core::models::availability::parse_clock;
    use tutora_core::models::BookingStatus;

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow::parse(start, end).unwrap()
    }

    fn accepted(session_type: SessionType, w: TimeWindow) -> BookingRequest {
        let now = Utc::now();
        BookingRequest {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            teacher_id: Uuid::new_v4(),
            booked_by_parent_id: None,
            session_type,
            subject_id: None,
            level_id: None,
            requested_date: parse_date("2024-01-08").unwrap(),
            start_time: w.start,
            end_time: w.end,
            message: None,
            status: BookingStatus::Accepted,
            decline_reason: None,
            session_id: None,
            series_id: None,
            responded_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_single_slot_must_cover_window() {
        let teacher = Uuid::new_v4();
        let slots = vec![
            AvailabilitySlot::new(teacher, 1, parse_clock("09:00").unwrap(), parse_clock("12:00").unwrap())
                .unwrap(),
            AvailabilitySlot::new(teacher, 1, parse_clock("12:00").unwrap(), parse_clock("17:00").unwrap())
                .unwrap(),
        ];

        assert!(covering_slot(&slots, &window("09:00", "10:00")).is_some());
        assert!(covering_slot(&slots, &window("13:00", "17:00")).is_some());
        // Spans both slots: not covered
        assert!(covering_slot(&slots, &window("11:00", "13:00")).is_none());
    }

    #[test]
    fn test_individual_blocked_by_any_overlap() {
        let existing = vec![accepted(SessionType::Group, window("09:00", "10:00"))];

        assert!(find_overlap(&existing, SessionType::Individual, &window("09:30", "10:30")).is_some());
        assert!(find_overlap(&existing, SessionType::Individual, &window("10:00", "11:00")).is_none());
    }

    #[test]
    fn test_group_blocked_only_by_individual() {
        let groups = vec![accepted(SessionType::Group, window("16:00", "17:00"))];
        assert!(find_overlap(&groups, SessionType::Group, &window("16:00", "17:00")).is_none());

        let solo = vec![accepted(SessionType::Individual, window("16:30", "17:30"))];
        assert!(find_overlap(&solo, SessionType::Group, &window("16:00", "17:00")).is_some());
    }

    #[test]
    fn test_merge_decision() {
        use SessionType::*;

        assert!(matches!(
            merge_decision(Group, Individual, true, 1, 1),
            Err(AppError::TimeConflict(_))
        ));
        assert!(matches!(
            merge_decision(Individual, Group, true, 1, 10),
            Err(AppError::TimeConflict(_))
        ));
        assert!(matches!(
            merge_decision(Group, Group, false, 1, 10),
            Err(AppError::TimeConflict(_))
        ));
        assert!(matches!(
            merge_decision(Group, Group, true, 10, 10),
            Err(AppError::SessionFull { current: 10, max: 10 })
        ));
        assert!(merge_decision(Group, Group, true, 1, 10).is_ok());
    }

    #[test]
    fn test_slot_instants_use_teacher_zone() {
        let date = parse_date("2024-01-08").unwrap();
        let (start, end) =
            slot_instants(date, &window("09:00", "10:00"), &chrono_tz::Africa::Algiers).unwrap();

        // Algiers is UTC+1 all year
        assert_eq!(start.to_rfc3339(), "2024-01-08T08:00:00+00:00");
        assert_eq!((end - start).num_minutes(), 60);
    }

    #[test]
    fn test_slot_instants_reject_skipped_local_time() {
        // Clocks jump from 02:00 to 03:00 in Paris on 2024-03-31
        let date = parse_date("2024-03-31").unwrap();
        let result = slot_instants(date, &window("02:15", "02:45"), &chrono_tz::Europe::Paris);
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    fn arb_window() -> impl Strategy<Value = TimeWindow> {
        (0u32..(24 * 4 - 1), 1u32..8).prop_map(|(start_q, len_q)| {
            let start = start_q * 15;
            let end = (start + len_q * 15).min(24 * 60 - 1);
            TimeWindow {
                start: chrono::NaiveTime::from_num_seconds_from_midnight_opt(start * 60, 0).unwrap(),
                end: chrono::NaiveTime::from_num_seconds_from_midnight_opt(end * 60, 0).unwrap(),
            }
        })
    }

    fn arb_type() -> impl Strategy<Value = SessionType> {
        prop_oneof![Just(SessionType::Individual), Just(SessionType::Group)]
    }

    proptest! {
        #[test]
        fn prop_accepted_individual_bookings_never_overlap(
            requests in proptest::collection::vec((arb_type(), arb_window()), 0..40)
        ) {
            let mut book: Vec<BookingRequest> = Vec::new();
            for (session_type, w) in requests {
                if find_overlap(&book, session_type, &w).is_none() {
                    book.push(accepted(session_type, w));
                }
            }

            for (i, a) in book.iter().enumerate() {
                for b in book.iter().skip(i + 1) {
                    if a.session_type == SessionType::Individual
                        || b.session_type == SessionType::Individual
                    {
                        prop_assert!(!a.window().overlaps(&b.window()));
                    }
                }
            }
        }
    }
}
