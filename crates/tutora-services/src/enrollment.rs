//! Session series and enrollment engine
//!
//! Roster changes lock the series row first, then the enrollment row, then
//! (through settlement) the wallet row. Students with an `accepted`
//! enrollment are participants of every active session of the series.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use tutora_core::models::{
    Caller, Enrollment, EnrollmentStatus, InitiatedBy, NewSeries, NotificationKind, SeriesStatus,
    SeriesSummary, Session, SessionSeries, SessionStatus, UserRole, WalletTransaction,
};
use tutora_core::traits::{
    Clock, EnrollmentRepository, IdentityDirectory, NotificationSink, SeriesRepository,
    SessionRepository, Store, StoreTx,
};
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

use crate::ledger::RefundOutcome;
use crate::outbox::Outbox;
use crate::resolve_student;
use crate::settlement::Settlement;

/// An accepted enrollment and the star it cost
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentAcceptance {
    pub enrollment: Enrollment,
    pub deduction: WalletTransaction,
}

/// A removal and, independently, what happened to its star
#[derive(Debug, Clone, Serialize)]
pub struct RemovalOutcome {
    pub enrollment: Enrollment,
    pub refund: RefundOutcome,
}

pub struct SeriesService<S: Store> {
    store: Arc<S>,
    directory: Arc<dyn IdentityDirectory>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settlement: Settlement,
}

async fn load_series<T: StoreTx>(tx: &mut T, series_id: Uuid) -> AppResult<SessionSeries> {
    tx.series_for_update(series_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("series {}", series_id)))
}

async fn load_enrollment<T: StoreTx>(
    tx: &mut T,
    series_id: Uuid,
    student_id: Uuid,
) -> AppResult<Enrollment> {
    tx.enrollment_for_update(series_id, student_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "enrollment of student {} in series {}",
                student_id, series_id
            ))
        })
}

fn expect_status(enrollment: &Enrollment, expected: EnrollmentStatus) -> AppResult<()> {
    if enrollment.status == expected {
        Ok(())
    } else {
        Err(AppError::InvalidStatus(format!(
            "enrollment {} is {}, expected {}",
            enrollment.id, enrollment.status, expected
        )))
    }
}

/// Seat a student in every session of the series that has not ended
async fn seat_student<T: StoreTx>(tx: &mut T, series_id: Uuid, student_id: Uuid) -> AppResult<()> {
    for session in tx.sessions_for_series(series_id).await? {
        if session.status.is_active() {
            tx.add_participant(session.id, student_id).await?;
        }
    }
    Ok(())
}

impl<S: Store> SeriesService<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settlement: Settlement,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            clock,
            settlement,
        }
    }

    /// Create a draft series owned by the calling teacher
    #[instrument(skip(self, input))]
    pub async fn create_series(&self, caller: &Caller, input: NewSeries) -> AppResult<SessionSeries> {
        caller.require_role(UserRole::Teacher)?;
        if input.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".to_string()));
        }
        let series = SessionSeries::new(caller.user_id, input, self.clock.now())?;

        let mut tx = self.store.begin().await?;
        tx.insert_series(&series).await?;
        tx.commit().await?;

        info!(
            "Series {} ({}) created by teacher {}",
            series.id, series.session_type, series.teacher_id
        );
        Ok(series)
    }

    /// Series with roster and schedule counters
    pub async fn get_series(&self, series_id: Uuid) -> AppResult<SeriesSummary> {
        let mut tx = self.store.begin().await?;
        let series = tx
            .find_series(series_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("series {}", series_id)))?;

        Ok(SeriesSummary {
            enrolled_count: tx
                .count_enrollments(series_id, EnrollmentStatus::Accepted)
                .await?,
            pending_count: tx
                .count_enrollments(series_id, EnrollmentStatus::Requested)
                .await?,
            invited_count: tx
                .count_enrollments(series_id, EnrollmentStatus::Invited)
                .await?,
            session_count: tx.count_sessions(series_id).await?,
            series,
        })
    }

    /// Sessions of a series in order
    pub async fn list_sessions(&self, series_id: Uuid) -> AppResult<Vec<Session>> {
        let mut tx = self.store.begin().await?;
        tx.find_series(series_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("series {}", series_id)))?;
        let sessions = tx.sessions_for_series(series_id).await?;
        Ok(sessions)
    }

    /// Full roster, visible to the series' teacher and admins
    pub async fn list_enrollments(&self, caller: &Caller, series_id: Uuid) -> AppResult<Vec<Enrollment>> {
        let mut tx = self.store.begin().await?;
        let series = tx
            .find_series(series_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("series {}", series_id)))?;
        if caller.role != UserRole::Admin {
            caller.require_owner(series.teacher_id, "series")?;
        }
        let enrollments = tx.list_enrollments(series_id).await?;
        Ok(enrollments)
    }

    /// Invite students; the whole call fails if any one cannot be invited
    #[instrument(skip(self, student_ids))]
    pub async fn invite(
        &self,
        caller: &Caller,
        series_id: Uuid,
        student_ids: Vec<Uuid>,
    ) -> AppResult<Vec<Enrollment>> {
        let mut seen = HashSet::new();
        let student_ids: Vec<Uuid> = student_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .collect();
        if student_ids.is_empty() {
            return Err(AppError::Validation(
                "at least one student must be invited".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let series = load_series(&mut tx, series_id).await?;
        caller.require_owner(series.teacher_id, "series")?;
        series.ensure_open()?;

        let enrolled = tx
            .count_enrollments(series_id, EnrollmentStatus::Accepted)
            .await?;
        series.ensure_capacity(enrolled, student_ids.len() as i64)?;

        let mut invited = Vec::with_capacity(student_ids.len());
        for student_id in &student_ids {
            let enrollment = match tx.enrollment_for_update(series_id, *student_id).await? {
                Some(mut existing) if existing.status.is_terminal() => {
                    existing.reopen(InitiatedBy::Teacher, now)?;
                    tx.update_enrollment(&existing).await?;
                    existing
                }
                Some(existing) => {
                    return Err(AppError::AlreadyRequested(format!(
                        "student {} is already {} in series {}",
                        student_id, existing.status, series_id
                    )));
                }
                None => {
                    let enrollment = Enrollment::invited(series_id, *student_id, now);
                    tx.insert_enrollment(&enrollment).await?;
                    enrollment
                }
            };
            invited.push(enrollment);
        }
        tx.commit().await?;

        info!("Invited {} students to series {}", invited.len(), series_id);

        let mut outbox = Outbox::new();
        for enrollment in &invited {
            outbox.push(
                enrollment.student_id,
                NotificationKind::SeriesInvitation,
                "New invitation",
                format!("You were invited to join \"{}\"", series.title),
                json!({ "series_id": series_id, "enrollment_id": enrollment.id }),
            );
        }
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(invited)
    }

    /// Student (or verified parent) asks to join an open series
    #[instrument(skip(self))]
    pub async fn request_to_join(
        &self,
        caller: &Caller,
        series_id: Uuid,
        for_child_id: Option<Uuid>,
    ) -> AppResult<Enrollment> {
        let student_id = resolve_student(self.directory.as_ref(), caller, for_child_id).await?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let series = load_series(&mut tx, series_id).await?;
        series.ensure_open()?;

        let existing = tx.enrollment_for_update(series_id, student_id).await?;
        if let Some(e) = &existing {
            if !e.status.is_terminal() {
                return Err(AppError::AlreadyRequested(format!(
                    "student {} is already {} in series {}",
                    student_id, e.status, series_id
                )));
            }
        }

        let enrolled = tx
            .count_enrollments(series_id, EnrollmentStatus::Accepted)
            .await?;
        series.ensure_capacity(enrolled, 1)?;

        let enrollment = match existing {
            Some(mut e) => {
                e.reopen(InitiatedBy::Student, now)?;
                tx.update_enrollment(&e).await?;
                e
            }
            None => {
                let e = Enrollment::requested(series_id, student_id, now);
                tx.insert_enrollment(&e).await?;
                e
            }
        };
        tx.commit().await?;

        info!("Student {} requested to join series {}", student_id, series_id);

        let mut outbox = Outbox::new();
        outbox.push(
            series.teacher_id,
            NotificationKind::JoinRequest,
            "New join request",
            format!("A student asked to join \"{}\"", series.title),
            json!({ "series_id": series_id, "enrollment_id": enrollment.id }),
        );
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(enrollment)
    }

    /// Student (or verified parent) accepts a teacher's invitation
    #[instrument(skip(self))]
    pub async fn accept_invitation(
        &self,
        caller: &Caller,
        series_id: Uuid,
        for_child_id: Option<Uuid>,
    ) -> AppResult<EnrollmentAcceptance> {
        let student_id = resolve_student(self.directory.as_ref(), caller, for_child_id).await?;
        let (series, acceptance) = self
            .accept(series_id, student_id, EnrollmentStatus::Invited, None)
            .await?;

        let mut outbox = Outbox::new();
        outbox.push(
            series.teacher_id,
            NotificationKind::EnrollmentAccepted,
            "Invitation accepted",
            format!("A student joined \"{}\"", series.title),
            json!({ "series_id": series_id, "enrollment_id": acceptance.enrollment.id }),
        );
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(acceptance)
    }

    /// Teacher accepts a student's join request
    #[instrument(skip(self))]
    pub async fn accept_request(
        &self,
        caller: &Caller,
        series_id: Uuid,
        student_id: Uuid,
    ) -> AppResult<EnrollmentAcceptance> {
        let (series, acceptance) = self
            .accept(series_id, student_id, EnrollmentStatus::Requested, Some(caller))
            .await?;

        let mut outbox = Outbox::new();
        outbox.push(
            student_id,
            NotificationKind::EnrollmentAccepted,
            "Request accepted",
            format!("You are now enrolled in \"{}\"", series.title),
            json!({ "series_id": series_id, "enrollment_id": acceptance.enrollment.id }),
        );
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(acceptance)
    }

    /// Shared accept path; `owner` is checked against the series' teacher
    async fn accept(
        &self,
        series_id: Uuid,
        student_id: Uuid,
        expected: EnrollmentStatus,
        owner: Option<&Caller>,
    ) -> AppResult<(SessionSeries, EnrollmentAcceptance)> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let series = load_series(&mut tx, series_id).await?;
        if let Some(caller) = owner {
            caller.require_owner(series.teacher_id, "series")?;
        }
        let mut enrollment = load_enrollment(&mut tx, series_id, student_id).await?;
        expect_status(&enrollment, expected)?;
        series.ensure_open()?;

        let enrolled = tx
            .count_enrollments(series_id, EnrollmentStatus::Accepted)
            .await?;
        series.ensure_capacity(enrolled, 1)?;

        let deduction = self
            .settlement
            .accept_enrollment(&mut tx, &series, &mut enrollment, now)
            .await?;
        seat_student(&mut tx, series_id, student_id).await?;
        tx.commit().await?;

        info!(
            "Enrollment {} accepted in series {}, star {} debited",
            enrollment.id, series_id, deduction.amount
        );
        Ok((
            series,
            EnrollmentAcceptance {
                enrollment,
                deduction,
            },
        ))
    }

    /// Student (or verified parent) turns down an invitation
    #[instrument(skip(self))]
    pub async fn decline_invitation(
        &self,
        caller: &Caller,
        series_id: Uuid,
        for_child_id: Option<Uuid>,
    ) -> AppResult<Enrollment> {
        let student_id = resolve_student(self.directory.as_ref(), caller, for_child_id).await?;
        let (series, enrollment) = self
            .decline(series_id, student_id, EnrollmentStatus::Invited, None)
            .await?;

        let mut outbox = Outbox::new();
        outbox.push(
            series.teacher_id,
            NotificationKind::EnrollmentDeclined,
            "Invitation declined",
            format!("A student declined your invitation to \"{}\"", series.title),
            json!({ "series_id": series_id, "enrollment_id": enrollment.id }),
        );
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(enrollment)
    }

    /// Teacher turns down a join request
    #[instrument(skip(self))]
    pub async fn decline_request(
        &self,
        caller: &Caller,
        series_id: Uuid,
        student_id: Uuid,
    ) -> AppResult<Enrollment> {
        let (series, enrollment) = self
            .decline(series_id, student_id, EnrollmentStatus::Requested, Some(caller))
            .await?;

        let mut outbox = Outbox::new();
        outbox.push(
            student_id,
            NotificationKind::EnrollmentDeclined,
            "Request declined",
            format!("Your request to join \"{}\" was declined", series.title),
            json!({ "series_id": series_id, "enrollment_id": enrollment.id }),
        );
        outbox.dispatch(self.notifier.as_ref()).await;

        Ok(enrollment)
    }

    async fn decline(
        &self,
        series_id: Uuid,
        student_id: Uuid,
        expected: EnrollmentStatus,
        owner: Option<&Caller>,
    ) -> AppResult<(SessionSeries, Enrollment)> {
        let mut tx = self.store.begin().await?;
        let series = load_series(&mut tx, series_id).await?;
        if let Some(caller) = owner {
            caller.require_owner(series.teacher_id, "series")?;
        }
        let mut enrollment = load_enrollment(&mut tx, series_id, student_id).await?;
        expect_status(&enrollment, expected)?;

        enrollment.transition(EnrollmentStatus::Declined, self.clock.now())?;
        tx.update_enrollment(&enrollment).await?;
        tx.commit().await?;

        info!("Enrollment {} declined", enrollment.id);
        Ok((series, enrollment))
    }

    /// Remove an accepted student, then try to refund their star
    ///
    /// The removal commits first and always stands. Repeating the call on a
    /// removed enrollment changes nothing but retries the refund, which is
    /// itself idempotent.
    #[instrument(skip(self))]
    pub async fn remove_student(
        &self,
        caller: &Caller,
        series_id: Uuid,
        student_id: Uuid,
    ) -> AppResult<RemovalOutcome> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let series = load_series(&mut tx, series_id).await?;
        caller.require_owner(series.teacher_id, "series")?;
        let mut enrollment = load_enrollment(&mut tx, series_id, student_id).await?;

        let status = enrollment.status;
        match status {
            EnrollmentStatus::Accepted => {
                enrollment.transition(EnrollmentStatus::Removed, now)?;
                tx.update_enrollment(&enrollment).await?;
                for session in tx.sessions_for_series(series_id).await? {
                    if session.status == SessionStatus::Scheduled {
                        tx.remove_participant(session.id, student_id).await?;
                    }
                }
                tx.commit().await?;

                info!("Student {} removed from series {}", student_id, series_id);

                let mut outbox = Outbox::new();
                outbox.push(
                    student_id,
                    NotificationKind::EnrollmentRemoved,
                    "Removed from series",
                    format!("You were removed from \"{}\"", series.title),
                    json!({ "series_id": series_id, "enrollment_id": enrollment.id }),
                );
                outbox.dispatch(self.notifier.as_ref()).await;
            }
            EnrollmentStatus::Removed => {
                drop(tx);
                info!(
                    "Student {} already removed from series {}, retrying refund only",
                    student_id, series_id
                );
            }
            other => {
                return Err(AppError::InvalidStatus(format!(
                    "enrollment {} is {}, only accepted students can be removed",
                    enrollment.id, other
                )));
            }
        }

        let refund = self
            .settlement
            .settle_removal(self.store.as_ref(), &enrollment, now)
            .await;
        if let RefundOutcome::Failed { message } = &refund {
            warn!("Removal of {} stands without refund: {}", enrollment.id, message);
        }

        Ok(RemovalOutcome { enrollment, refund })
    }

    /// Append dated sessions; the first one activates a draft series
    #[instrument(skip(self, starts))]
    pub async fn add_sessions(
        &self,
        caller: &Caller,
        series_id: Uuid,
        starts: Vec<DateTime<Utc>>,
    ) -> AppResult<Vec<Session>> {
        if starts.is_empty() {
            return Err(AppError::Validation(
                "at least one session start is required".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        // Schedule lock before the series row, as booking acceptance does
        let teacher_id = tx
            .find_series(series_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("series {}", series_id)))?
            .teacher_id;
        caller.require_owner(teacher_id, "series")?;
        tx.lock_teacher_schedule(teacher_id).await?;
        let mut series = load_series(&mut tx, series_id).await?;
        series.ensure_open()?;

        let roster: Vec<Uuid> = tx
            .list_enrollments(series_id)
            .await?
            .into_iter()
            .filter(|e| e.status == EnrollmentStatus::Accepted)
            .map(|e| e.student_id)
            .collect();

        let mut number = tx.count_sessions(series_id).await? as i32;
        let duration = series.session_duration();
        let mut created = Vec::with_capacity(starts.len());
        for start in starts {
            number += 1;
            let session = Session::scheduled(
                Some(series_id),
                series.teacher_id,
                number,
                start,
                start + duration,
                series.max_students,
                now,
            );
            tx.insert_session(&session).await?;
            for student_id in &roster {
                tx.add_participant(session.id, *student_id).await?;
            }
            created.push(session);
        }

        if series.status == SeriesStatus::Draft {
            series.status = SeriesStatus::Active;
            series.updated_at = now;
            tx.update_series(&series).await?;
        }
        tx.commit().await?;

        info!("Added {} sessions to series {}", created.len(), series_id);
        Ok(created)
    }

    /// Close the series; needs a session and an accepted student
    #[instrument(skip(self))]
    pub async fn finalize(&self, caller: &Caller, series_id: Uuid) -> AppResult<SessionSeries> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut series = load_series(&mut tx, series_id).await?;
        caller.require_owner(series.teacher_id, "series")?;

        if series.is_finalized() {
            return Err(AppError::InvalidStatus(format!(
                "series {} is already finalized",
                series_id
            )));
        }
        series.ensure_open()?;

        if tx.count_sessions(series_id).await? < 1 {
            return Err(AppError::InvalidStatus(
                "series needs at least one session before it can be finalized".to_string(),
            ));
        }
        if tx
            .count_enrollments(series_id, EnrollmentStatus::Accepted)
            .await?
            < 1
        {
            return Err(AppError::InvalidStatus(
                "series needs at least one accepted student before it can be finalized"
                    .to_string(),
            ));
        }

        series.status = SeriesStatus::Finalized;
        series.finalized_at = Some(now);
        series.updated_at = now;
        tx.update_series(&series).await?;
        tx.commit().await?;

        info!("Series {} finalized", series_id);
        Ok(series)
    }
}
