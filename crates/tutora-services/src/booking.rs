//! Booking request lifecycle
//!
//! `pending -> accepted | declined | cancelled`, all terminal.
//!
//! Acceptance is the only path that touches shared schedule state. It runs in
//! one transaction holding the teacher's schedule lock and either joins an
//! explicit series, merges into a compatible group session at the exact same
//! window, or creates a fresh series with its first session. The student's
//! enrollment is accepted (and its star debited) in that same transaction.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use tutora_core::config::SchedulingConfig;
use tutora_core::models::{
    availability::parse_date, BookingFilter, BookingRequest, BookingStatus, Caller, Enrollment,
    EnrollmentStatus, InitiatedBy, NewSeries, NotificationKind, SeriesStatus, Session,
    SessionSeries, SessionType, TimeWindow, UserRole, WalletTransaction,
};
use tutora_core::traits::{
    BookingRepository, Clock, EnrollmentRepository, IdentityDirectory, NotificationSink,
    PaginatedResponse, Pagination, SeriesRepository, SessionRepository, Store, StoreTx,
};
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

use crate::conflict::{self, merge_decision, slot_instants};
use crate::outbox::Outbox;
use crate::resolve_student;
use crate::settlement::Settlement;

/// Input for a new booking request
#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub teacher_id: Uuid,
    /// Required when a parent books for a child
    pub for_child_id: Option<Uuid>,
    #[serde(default)]
    pub session_type: SessionType,
    pub subject_id: Option<Uuid>,
    pub level_id: Option<Uuid>,
    /// `YYYY-MM-DD`
    pub requested_date: String,
    /// `HH:MM`
    pub start_time: String,
    /// `HH:MM`
    pub end_time: String,
    pub message: Option<String>,
}

/// Teacher's choices when accepting
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptBooking {
    /// Join this series instead of searching for a session to merge into
    pub existing_series_id: Option<Uuid>,
    /// Price of a series created by this acceptance
    pub price: Option<Decimal>,
    /// Title of a series created by this acceptance
    pub title: Option<String>,
}

/// Outcome of an acceptance
#[derive(Debug, Clone, Serialize)]
pub struct BookingAcceptance {
    pub booking: BookingRequest,
    pub session_id: Uuid,
    pub series_id: Uuid,
    /// True when the booking was merged into an existing group session
    pub merged: bool,
    /// Star debited for the enrollment; absent when the student was already accepted
    pub deduction: Option<WalletTransaction>,
}

/// Listing filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingQuery {
    pub status: Option<BookingStatus>,
    /// Child to list for (parents) or student to narrow to (teachers, admins)
    pub student_id: Option<Uuid>,
}

/// Where an accepted booking lands
enum Placement {
    Join(SessionSeries),
    Merge(SessionSeries, Session),
    New,
}

pub struct BookingService<S: Store> {
    store: Arc<S>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settlement: Settlement,
    scheduling: SchedulingConfig,
    tz: Tz,
}

impl<S: Store> BookingService<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settlement: Settlement,
        scheduling: SchedulingConfig,
        tz: Tz,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            clock,
            settlement,
            scheduling,
            tz,
        }
    }

    /// Create a pending request after an advisory slot check
    ///
    /// Other pending requests for the same slot are not conflicts; the
    /// teacher's acceptance order decides.
    #[instrument(skip(self, input), fields(teacher_id = %input.teacher_id))]
    pub async fn create(&self, caller: &Caller, input: NewBooking) -> AppResult<BookingRequest> {
        let student_id =
            resolve_student(self.directory.as_ref(), caller, input.for_child_id).await?;
        let date = parse_date(&input.requested_date)?;
        let window = TimeWindow::parse(&input.start_time, &input.end_time)?;
        slot_instants(date, &window, &self.tz)?;

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        conflict::check_slot(&mut tx, input.teacher_id, date, input.session_type, &window)
            .await
            .map_err(|e| {
                if e.is_slot_conflict() {
                    debug!("Booking rejected for teacher {}: {}", input.teacher_id, e);
                }
                e
            })?;

        let booking = BookingRequest {
            id: Uuid::new_v4(),
            student_id,
            teacher_id: input.teacher_id,
            booked_by_parent_id: (caller.role == UserRole::Parent).then_some(caller.user_id),
            session_type: input.session_type,
            subject_id: input.subject_id,
            level_id: input.level_id,
            requested_date: date,
            start_time: window.start,
            end_time: window.end,
            message: input.message.filter(|m| !m.trim().is_empty()),
            status: BookingStatus::Pending,
            decline_reason: None,
            session_id: None,
            series_id: None,
            responded_at: None,
            created_at: now,
            updated_at: now,
        };
        tx.insert_booking(&booking).await?;
        tx.commit().await?;

        info!(
            "Booking {} created for student {} with teacher {} at {}",
            booking.id,
            student_id,
            booking.teacher_id,
            booking.slot_label()
        );

        let mut outbox = Outbox::new();
        outbox.push(
            booking.teacher_id,
            NotificationKind::BookingCreated,
            "New booking request",
            format!("A {} session was requested for {}", booking.session_type, booking.slot_label()),
            json!({ "booking_id": booking.id }),
        );
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(booking)
    }

    /// Accept a pending request and place it on the schedule
    #[instrument(skip(self, input))]
    pub async fn accept(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        input: AcceptBooking,
    ) -> AppResult<BookingAcceptance> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let teacher_id = tx
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?
            .teacher_id;
        caller.require_owner(teacher_id, "booking")?;

        tx.lock_teacher_schedule(teacher_id).await?;
        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;
        booking.ensure_pending()?;

        let (start, end) = slot_instants(booking.requested_date, &booking.window(), &self.tz)?;

        let placement = match input.existing_series_id {
            Some(series_id) => self.join_target(&mut tx, caller, &booking, series_id).await?,
            None => self.merge_target(&mut tx, &booking, start, end).await?,
        };

        // Authoritative overlap check, now that the schedule is locked
        conflict::check_overlap(
            &mut tx,
            teacher_id,
            booking.requested_date,
            booking.session_type,
            &booking.window(),
        )
        .await
        .map_err(|e| {
            warn!("Booking {} lost its slot: {}", booking.id, e);
            e
        })?;

        let (series, session, merged) = match placement {
            Placement::Join(series) => {
                let session = self.append_session(&mut tx, series.clone(), start, end, now).await?;
                (series, session, false)
            }
            Placement::Merge(series, session) => (series, session, true),
            Placement::New => {
                let series = self.new_series(&booking, &input, start, end, now)?;
                tx.insert_series(&series).await?;
                let session = Session::scheduled(
                    Some(series.id),
                    teacher_id,
                    1,
                    start,
                    end,
                    series.max_students,
                    now,
                );
                tx.insert_session(&session).await?;
                (series, session, false)
            }
        };

        let deduction = match tx.enrollment_for_update(series.id, booking.student_id).await? {
            Some(existing) if existing.status == EnrollmentStatus::Accepted => None,
            Some(mut existing) => {
                if existing.status.is_terminal() {
                    existing.reopen(InitiatedBy::Student, now)?;
                }
                Some(
                    self.settlement
                        .accept_enrollment(&mut tx, &series, &mut existing, now)
                        .await?,
                )
            }
            None => {
                let mut enrollment = Enrollment::requested(series.id, booking.student_id, now);
                tx.insert_enrollment(&enrollment).await?;
                Some(
                    self.settlement
                        .accept_enrollment(&mut tx, &series, &mut enrollment, now)
                        .await?,
                )
            }
        };

        tx.add_participant(session.id, booking.student_id).await?;
        booking.accept(session.id, series.id, now);
        tx.update_booking(&booking).await?;
        tx.commit().await?;

        info!(
            "Booking {} accepted into session {} of series {} (merged: {})",
            booking.id, session.id, series.id, merged
        );

        let mut outbox = Outbox::new();
        let body = format!("Your session on {} is confirmed", booking.slot_label());
        let data = json!({
            "booking_id": booking.id,
            "session_id": session.id,
            "series_id": series.id,
        });
        outbox.push(
            booking.student_id,
            NotificationKind::BookingAccepted,
            "Booking accepted",
            body.clone(),
            data.clone(),
        );
        if let Some(parent_id) = booking.booked_by_parent_id {
            outbox.push(parent_id, NotificationKind::BookingAccepted, "Booking accepted", body, data);
        }
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(BookingAcceptance {
            session_id: session.id,
            series_id: series.id,
            merged,
            deduction,
            booking,
        })
    }

    /// Explicit series target; capacity counts accepted enrollments
    async fn join_target(
        &self,
        tx: &mut S::Tx,
        caller: &Caller,
        booking: &BookingRequest,
        series_id: Uuid,
    ) -> AppResult<Placement> {
        let series = tx
            .series_for_update(series_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("series {}", series_id)))?;
        caller.require_owner(series.teacher_id, "series")?;
        series.ensure_open()?;

        let seated = matches!(
            tx.enrollment_for_update(series.id, booking.student_id).await?,
            Some(e) if e.status == EnrollmentStatus::Accepted
        );
        if !seated {
            let enrolled = tx
                .count_enrollments(series.id, EnrollmentStatus::Accepted)
                .await?;
            series.ensure_capacity(enrolled, 1)?;
        }
        Ok(Placement::Join(series))
    }

    /// Active session at the exact window decides between merge and new
    async fn merge_target(
        &self,
        tx: &mut S::Tx,
        booking: &BookingRequest,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Placement> {
        let Some((session, existing_type)) =
            tx.active_session_at(booking.teacher_id, start, end).await?
        else {
            return Ok(Placement::New);
        };

        let series = match session.series_id {
            Some(series_id) => tx.series_for_update(series_id).await?,
            None => None,
        };
        let offering_matches = series
            .as_ref()
            .map(|s| s.same_offering(booking.subject_id, booking.level_id))
            .unwrap_or(false);

        let participants = tx.participants(session.id).await?;
        let occupied = participants
            .iter()
            .filter(|p| **p != booking.student_id)
            .count() as i64;

        merge_decision(
            booking.session_type,
            existing_type,
            offering_matches,
            occupied,
            session.max_participants,
        )
        .map_err(|e| {
            warn!(
                "Booking {} cannot merge into session {}: {}",
                booking.id, session.id, e
            );
            e
        })?;

        let series = series.ok_or_else(|| {
            AppError::TimeConflict("an unscheduled session already occupies this time".to_string())
        })?;
        // A finalized or cancelled series takes no one new, but its session
        // still holds the slot.
        if !series.status.is_open() {
            warn!(
                "Booking {} cannot merge into {} series {}",
                booking.id, series.status, series.id
            );
            return Err(AppError::TimeConflict(format!(
                "a group session of a {} series already occupies this time",
                series.status
            )));
        }
        debug!("Booking {} merges into session {}", booking.id, session.id);
        Ok(Placement::Merge(series, session))
    }

    /// Next numbered session of a joined series, seated with its roster
    async fn append_session(
        &self,
        tx: &mut S::Tx,
        mut series: SessionSeries,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Session> {
        let number = tx.count_sessions(series.id).await? + 1;
        let session = Session::scheduled(
            Some(series.id),
            series.teacher_id,
            number as i32,
            start,
            end,
            series.max_students,
            now,
        );
        tx.insert_session(&session).await?;

        for enrollment in tx.list_enrollments(series.id).await? {
            if enrollment.status == EnrollmentStatus::Accepted {
                tx.add_participant(session.id, enrollment.student_id).await?;
            }
        }

        if series.status == SeriesStatus::Draft {
            series.status = SeriesStatus::Active;
            series.updated_at = now;
            tx.update_series(&series).await?;
        }
        Ok(session)
    }

    fn new_series(
        &self,
        booking: &BookingRequest,
        input: &AcceptBooking,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<SessionSeries> {
        let max_students = match booking.session_type {
            SessionType::Individual => 1,
            SessionType::Group => self.scheduling.default_group_capacity,
        };
        let title = input
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("{} session {}", booking.session_type, booking.slot_label()));

        let mut series = SessionSeries::new(
            booking.teacher_id,
            NewSeries {
                title,
                session_type: booking.session_type,
                subject_id: booking.subject_id,
                level_id: booking.level_id,
                duration_hours: Decimal::from((end - start).num_minutes()) / Decimal::from(60),
                min_students: 1,
                max_students,
                price: input.price,
            },
            now,
        )?;
        series.status = SeriesStatus::Active;
        Ok(series)
    }

    /// Decline a pending request with a reason
    #[instrument(skip(self, reason))]
    pub async fn decline(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        reason: &str,
    ) -> AppResult<BookingRequest> {
        let reason = reason.trim();
        if reason.chars().count() < self.scheduling.min_decline_reason_len {
            return Err(AppError::Validation(format!(
                "decline reason must be at least {} characters",
                self.scheduling.min_decline_reason_len
            )));
        }

        let mut tx = self.store.begin().await?;
        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;
        caller.require_owner(booking.teacher_id, "booking")?;
        booking.ensure_pending()?;

        booking.decline(reason.to_string(), self.clock.now());
        tx.update_booking(&booking).await?;
        tx.commit().await?;

        info!("Booking {} declined by teacher {}", booking.id, caller.user_id);

        let mut outbox = Outbox::new();
        let body = format!("Your request for {} was declined: {}", booking.slot_label(), reason);
        outbox.push(
            booking.student_id,
            NotificationKind::BookingDeclined,
            "Booking declined",
            body.clone(),
            json!({ "booking_id": booking.id }),
        );
        if let Some(parent_id) = booking.booked_by_parent_id {
            outbox.push(
                parent_id,
                NotificationKind::BookingDeclined,
                "Booking declined",
                body,
                json!({ "booking_id": booking.id }),
            );
        }
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(booking)
    }

    /// Withdraw a pending request (student or the parent who booked it)
    #[instrument(skip(self))]
    pub async fn cancel(&self, caller: &Caller, booking_id: Uuid) -> AppResult<BookingRequest> {
        let mut tx = self.store.begin().await?;
        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;

        let is_requester = caller.user_id == booking.student_id
            || booking.booked_by_parent_id == Some(caller.user_id);
        if !is_requester {
            return Err(AppError::Unauthorized(
                "only the student or the booking parent can cancel".to_string(),
            ));
        }
        booking.ensure_pending()?;

        booking.cancel(self.clock.now());
        tx.update_booking(&booking).await?;
        tx.commit().await?;

        info!("Booking {} cancelled by {}", booking.id, caller.user_id);

        let mut outbox = Outbox::new();
        outbox.push(
            booking.teacher_id,
            NotificationKind::BookingCancelled,
            "Booking cancelled",
            format!("The request for {} was withdrawn", booking.slot_label()),
            json!({ "booking_id": booking.id }),
        );
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(booking)
    }

    /// Visible to the student, the booking parent, the teacher and admins
    pub async fn get(&self, caller: &Caller, booking_id: Uuid) -> AppResult<BookingRequest> {
        let mut tx = self.store.begin().await?;
        let booking = tx
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("booking {}", booking_id)))?;

        let visible = caller.role == UserRole::Admin
            || caller.user_id == booking.student_id
            || caller.user_id == booking.teacher_id
            || booking.booked_by_parent_id == Some(caller.user_id);
        if !visible {
            return Err(AppError::Unauthorized(
                "caller is not a party to this booking".to_string(),
            ));
        }
        Ok(booking)
    }

    /// Teacher inbox, student history, or a parent's view of a child
    pub async fn list(
        &self,
        caller: &Caller,
        query: BookingQuery,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<BookingRequest>> {
        let mut filter = BookingFilter {
            status: query.status,
            limit: pagination.limit(),
            offset: pagination.offset(),
            ..Default::default()
        };

        match caller.role {
            UserRole::Teacher => {
                filter.teacher_id = Some(caller.user_id);
                filter.student_id = query.student_id;
            }
            UserRole::Student | UserRole::Parent => {
                filter.student_id = Some(
                    resolve_student(self.directory.as_ref(), caller, query.student_id).await?,
                );
            }
            UserRole::Admin => filter.student_id = query.student_id,
        }

        let mut tx = self.store.begin().await?;
        let (bookings, total) = tx.list_bookings(&filter).await?;
        Ok(PaginatedResponse::new(bookings, total, pagination))
    }
}
