//! End-to-end scheduling and ledger flows against the in-memory store

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tutora_core::config::{SchedulingConfig, StarsConfig};
use tutora_core::models::{
    BookingStatus, Caller, EnrollmentStatus, NewSeries, SeriesStatus, SessionSeries,
    SessionType, TransactionType, WalletTransaction,
};
use tutora_core::traits::{Clock, Pagination};
use tutora_core::AppError;
use tutora_db::{MemoryDirectory, MemoryNotificationSink, MemoryStore};
use tutora_services::{
    AcceptBooking, AvailabilityService, BookingService, LocalRoomProvider, NewBooking,
    RefundOutcome, SeriesService, SessionService, Settlement, SlotInput, WalletLedger,
};
use uuid::Uuid;

/// 2030-01-01 was a Tuesday; 2030-01-07 is the following Monday
const MONDAY: &str = "2030-01-07";

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

struct Harness {
    directory: Arc<MemoryDirectory>,
    bookings: BookingService<MemoryStore>,
    series: SeriesService<MemoryStore>,
    ledger: WalletLedger<MemoryStore>,
    sessions: SessionService<MemoryStore>,
    availability: AvailabilityService<MemoryStore>,
    admin: Caller,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let notifier = Arc::new(MemoryNotificationSink::new());
        let clock: Arc<dyn Clock> =
            Arc::new(FixedClock(Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap()));
        let scheduling = SchedulingConfig::default();
        let tz = scheduling.tz().unwrap();
        let settlement = Settlement::new(StarsConfig::default());

        Self {
            bookings: BookingService::new(
                store.clone(),
                directory.clone(),
                notifier.clone(),
                clock.clone(),
                settlement.clone(),
                scheduling,
                tz,
            ),
            series: SeriesService::new(
                store.clone(),
                directory.clone(),
                notifier.clone(),
                clock.clone(),
                settlement,
            ),
            ledger: WalletLedger::new(store.clone(), notifier.clone(), clock.clone()),
            sessions: SessionService::new(
                store.clone(),
                directory.clone(),
                notifier,
                Arc::new(LocalRoomProvider::new()),
                clock,
            ),
            availability: AvailabilityService::new(store),
            directory,
            admin: Caller::admin(Uuid::new_v4()),
        }
    }

    async fn fund(&self, teacher: &Caller, amount: Decimal) {
        let purchase = self.ledger.buy_credits(teacher, amount, None).await.unwrap();
        self.ledger
            .review_purchase(&self.admin, purchase.id, true)
            .await
            .unwrap();
    }

    async fn balance(&self, teacher: &Caller) -> Decimal {
        let wallet = self.ledger.wallet(teacher).await.unwrap();
        assert!(wallet.is_reconciled());
        wallet.balance
    }

    async fn transactions(&self, teacher: &Caller, kind: TransactionType) -> Vec<WalletTransaction> {
        self.ledger
            .history(teacher, &Pagination::new(1, 100))
            .await
            .unwrap()
            .data
            .into_iter()
            .filter(|t| t.transaction_type == kind)
            .collect()
    }

    async fn open_monday(&self, teacher: &Caller) {
        self.availability
            .set(
                teacher,
                vec![SlotInput {
                    day_of_week: 1,
                    start_time: "09:00".to_string(),
                    end_time: "17:00".to_string(),
                }],
            )
            .await
            .unwrap();
    }

    async fn group_series(&self, teacher: &Caller) -> SessionSeries {
        self.group_series_of(teacher, 5).await
    }

    async fn group_series_of(&self, teacher: &Caller, max_students: i32) -> SessionSeries {
        self.series
            .create_series(
                teacher,
                NewSeries {
                    title: "Terminale maths".to_string(),
                    session_type: SessionType::Group,
                    subject_id: None,
                    level_id: None,
                    duration_hours: dec!(1.5),
                    min_students: 1,
                    max_students,
                    price: Some(dec!(1500)),
                },
            )
            .await
            .unwrap()
    }

    async fn enroll(&self, teacher: &Caller, series_id: Uuid) -> Caller {
        let student = Caller::student(Uuid::new_v4());
        self.series.request_to_join(&student, series_id, None).await.unwrap();
        self.series
            .accept_request(teacher, series_id, student.user_id)
            .await
            .unwrap();
        student
    }
}

fn booking(teacher: &Caller, session_type: SessionType, start: &str, end: &str) -> NewBooking {
    NewBooking {
        teacher_id: teacher.user_id,
        for_child_id: None,
        session_type,
        subject_id: None,
        level_id: None,
        requested_date: MONDAY.to_string(),
        start_time: start.to_string(),
        end_time: end.to_string(),
        message: None,
    }
}

#[tokio::test]
async fn test_individual_booking_becomes_session() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;

    let pending = h
        .bookings
        .create(&student, booking(&teacher, SessionType::Individual, "09:00", "10:00"))
        .await
        .unwrap();
    assert_eq!(pending.status, BookingStatus::Pending);

    let accepted = h
        .bookings
        .accept(
            &teacher,
            pending.id,
            AcceptBooking {
                price: Some(dec!(2000)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(accepted.booking.status, BookingStatus::Accepted);
    assert!(!accepted.merged);

    let summary = h.series.get_series(accepted.series_id).await.unwrap();
    assert_eq!(summary.series.price, Some(dec!(2000)));
    assert_eq!(summary.series.max_students, 1);
    assert_eq!(summary.enrolled_count, 1);

    let view = h.sessions.get_session(&teacher, accepted.session_id).await.unwrap();
    assert_eq!(view.participants, vec![student.user_id]);
    assert_eq!(h.balance(&teacher).await, dec!(900));
}

#[tokio::test]
async fn test_group_request_conflicts_with_accepted_individual() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let first = Caller::student(Uuid::new_v4());
    let second = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;

    let individual = h
        .bookings
        .create(&first, booking(&teacher, SessionType::Individual, "09:00", "10:00"))
        .await
        .unwrap();
    // Pending requests never block each other
    let group = h
        .bookings
        .create(&second, booking(&teacher, SessionType::Group, "09:00", "10:00"))
        .await
        .unwrap();
    assert_eq!(group.status, BookingStatus::Pending);

    h.bookings
        .accept(&teacher, individual.id, AcceptBooking::default())
        .await
        .unwrap();

    match h.bookings.accept(&teacher, group.id, AcceptBooking::default()).await {
        Err(AppError::TimeConflict(message)) => {
            assert!(message.contains("already have an individual session at this time"))
        }
        other => panic!("expected a time conflict, got {:?}", other),
    }

    let still_pending = h.bookings.get(&teacher, group.id).await.unwrap();
    assert_eq!(still_pending.status, BookingStatus::Pending);
    assert_eq!(h.balance(&teacher).await, dec!(900));
}

#[tokio::test]
async fn test_second_group_booking_merges_into_session() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let a = Caller::student(Uuid::new_v4());
    let b = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;

    let booking_a = h
        .bookings
        .create(&a, booking(&teacher, SessionType::Group, "16:00", "17:00"))
        .await
        .unwrap();
    let booking_b = h
        .bookings
        .create(&b, booking(&teacher, SessionType::Group, "16:00", "17:00"))
        .await
        .unwrap();

    let first = h
        .bookings
        .accept(&teacher, booking_a.id, AcceptBooking::default())
        .await
        .unwrap();
    let second = h
        .bookings
        .accept(&teacher, booking_b.id, AcceptBooking::default())
        .await
        .unwrap();

    assert!(second.merged);
    assert_eq!(first.session_id, second.session_id);
    assert_eq!(first.series_id, second.series_id);

    let view = h.sessions.get_session(&teacher, first.session_id).await.unwrap();
    assert_eq!(view.participants.len(), 2);
    assert_eq!(h.balance(&teacher).await, dec!(900));
}

#[tokio::test]
async fn test_booking_outside_availability_lists_open_windows() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;

    match h
        .bookings
        .create(&student, booking(&teacher, SessionType::Individual, "16:30", "17:30"))
        .await
    {
        Err(AppError::SlotNotAvailable { available_slots, .. }) => {
            assert_eq!(available_slots, vec!["09:00-17:00".to_string()])
        }
        other => panic!("expected slot not available, got {:?}", other),
    }
}

#[tokio::test]
async fn test_parent_books_for_verified_child_only() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let parent = Caller::parent(Uuid::new_v4());
    let child = Uuid::new_v4();
    h.open_monday(&teacher).await;

    let mut input = booking(&teacher, SessionType::Individual, "11:00", "12:00");
    input.for_child_id = Some(child);
    let result = h.bookings.create(&parent, input.clone()).await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));

    h.directory.link_parent(parent.user_id, child);
    let created = h.bookings.create(&parent, input).await.unwrap();
    assert_eq!(created.student_id, child);
    assert_eq!(created.booked_by_parent_id, Some(parent.user_id));
}

#[tokio::test]
async fn test_removal_before_start_refunds_star() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.fund(&teacher, dec!(600)).await;
    let series = h.group_series(&teacher).await;

    h.series.request_to_join(&student, series.id, None).await.unwrap();
    let acceptance = h
        .series
        .accept_request(&teacher, series.id, student.user_id)
        .await
        .unwrap();
    assert_eq!(acceptance.deduction.amount, dec!(50));
    assert_eq!(h.balance(&teacher).await, dec!(550));
    assert_eq!(h.transactions(&teacher, TransactionType::StarDeduction).await.len(), 1);

    let removal = h
        .series
        .remove_student(&teacher, series.id, student.user_id)
        .await
        .unwrap();
    assert_eq!(removal.enrollment.status, EnrollmentStatus::Removed);
    assert!(removal.refund.is_refunded());
    assert_eq!(h.balance(&teacher).await, dec!(600));

    let refunds = h.transactions(&teacher, TransactionType::Refund).await;
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, dec!(50));
    assert_eq!(refunds[0].enrollment_id, Some(acceptance.enrollment.id));
}

#[tokio::test]
async fn test_removal_after_start_keeps_star() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.fund(&teacher, dec!(600)).await;
    let series = h.group_series(&teacher).await;

    h.series.request_to_join(&student, series.id, None).await.unwrap();
    h.series
        .accept_request(&teacher, series.id, student.user_id)
        .await
        .unwrap();

    let start = Utc.with_ymd_and_hms(2030, 1, 7, 15, 0, 0).unwrap();
    let sessions = h
        .series
        .add_sessions(&teacher, series.id, vec![start])
        .await
        .unwrap();
    h.sessions.start_session(&teacher, sessions[0].id).await.unwrap();

    let removal = h
        .series
        .remove_student(&teacher, series.id, student.user_id)
        .await
        .unwrap();
    assert_eq!(removal.enrollment.status, EnrollmentStatus::Removed);
    assert!(matches!(removal.refund, RefundOutcome::NotEligible { .. }));
    assert_eq!(h.balance(&teacher).await, dec!(550));
    assert!(h.transactions(&teacher, TransactionType::Refund).await.is_empty());
}

#[tokio::test]
async fn test_empty_wallet_blocks_acceptance() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    let series = h.group_series(&teacher).await;

    h.series.request_to_join(&student, series.id, None).await.unwrap();
    let result = h
        .series
        .accept_request(&teacher, series.id, student.user_id)
        .await;
    assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));

    let roster = h.series.list_enrollments(&teacher, series.id).await.unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].status, EnrollmentStatus::Requested);

    assert_eq!(h.balance(&teacher).await, Decimal::ZERO);
    assert!(h.transactions(&teacher, TransactionType::StarDeduction).await.is_empty());
}

#[tokio::test]
async fn test_repeated_removal_refunds_once() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.fund(&teacher, dec!(600)).await;
    let series = h.group_series(&teacher).await;

    h.series.request_to_join(&student, series.id, None).await.unwrap();
    h.series
        .accept_request(&teacher, series.id, student.user_id)
        .await
        .unwrap();

    let first = h
        .series
        .remove_student(&teacher, series.id, student.user_id)
        .await
        .unwrap();
    let second = h
        .series
        .remove_student(&teacher, series.id, student.user_id)
        .await
        .unwrap();

    assert!(first.refund.is_refunded());
    assert!(matches!(second.refund, RefundOutcome::AlreadyRefunded));
    assert_eq!(first.enrollment.status, second.enrollment.status);
    assert_eq!(h.balance(&teacher).await, dec!(600));
    assert_eq!(h.transactions(&teacher, TransactionType::Refund).await.len(), 1);
}

#[tokio::test]
async fn test_accept_request_moves_one_seat() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    let other = Caller::student(Uuid::new_v4());
    h.fund(&teacher, dec!(600)).await;
    let series = h.group_series(&teacher).await;

    h.series.request_to_join(&student, series.id, None).await.unwrap();
    h.series.request_to_join(&other, series.id, None).await.unwrap();
    let before = h.series.get_series(series.id).await.unwrap();

    h.series
        .accept_request(&teacher, series.id, student.user_id)
        .await
        .unwrap();
    let after = h.series.get_series(series.id).await.unwrap();

    assert_eq!(after.enrolled_count, before.enrolled_count + 1);
    assert_eq!(after.pending_count, before.pending_count - 1);
}

#[tokio::test]
async fn test_invitation_accepted_by_parent() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let parent = Caller::parent(Uuid::new_v4());
    let child = Uuid::new_v4();
    h.directory.link_parent(parent.user_id, child);
    h.fund(&teacher, dec!(100)).await;
    let series = h.group_series(&teacher).await;

    h.series.invite(&teacher, series.id, vec![child]).await.unwrap();
    let acceptance = h
        .series
        .accept_invitation(&parent, series.id, Some(child))
        .await
        .unwrap();

    assert_eq!(acceptance.enrollment.student_id, child);
    assert_eq!(acceptance.enrollment.status, EnrollmentStatus::Accepted);
    assert_eq!(h.balance(&teacher).await, dec!(50));
}

#[tokio::test]
async fn test_finalize_needs_session_and_student() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    h.fund(&teacher, dec!(600)).await;
    let series = h.group_series(&teacher).await;

    let result = h.series.finalize(&teacher, series.id).await;
    assert!(matches!(result, Err(AppError::InvalidStatus(_))));

    let start = Utc.with_ymd_and_hms(2030, 1, 7, 15, 0, 0).unwrap();
    h.series
        .add_sessions(&teacher, series.id, vec![start])
        .await
        .unwrap();
    let result = h.series.finalize(&teacher, series.id).await;
    assert!(matches!(result, Err(AppError::InvalidStatus(_))));

    h.enroll(&teacher, series.id).await;
    let other = Caller::teacher(Uuid::new_v4());
    let result = h.series.finalize(&other, series.id).await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));

    let finalized = h.series.finalize(&teacher, series.id).await.unwrap();
    assert_eq!(finalized.status, SeriesStatus::Finalized);
    assert!(finalized.finalized_at.is_some());

    match h.series.finalize(&teacher, series.id).await {
        Err(AppError::InvalidStatus(message)) => assert!(message.contains("already finalized")),
        other => panic!("expected invalid status, got {:?}", other),
    }

    let late = Caller::student(Uuid::new_v4());
    let result = h.series.request_to_join(&late, series.id, None).await;
    assert!(matches!(result, Err(AppError::InvalidStatus(_))));
}

#[tokio::test]
async fn test_decline_needs_reason_and_pending_booking() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;

    let pending = h
        .bookings
        .create(&student, booking(&teacher, SessionType::Individual, "09:00", "10:00"))
        .await
        .unwrap();

    let result = h.bookings.decline(&teacher, pending.id, "  busy   ").await;
    assert!(matches!(result, Err(AppError::Validation(_))));

    let stranger = Caller::teacher(Uuid::new_v4());
    let result = h
        .bookings
        .decline(&stranger, pending.id, "Not my student at all")
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));

    let declined = h
        .bookings
        .decline(&teacher, pending.id, "Fully booked that week")
        .await
        .unwrap();
    assert_eq!(declined.status, BookingStatus::Declined);
    assert_eq!(declined.decline_reason.as_deref(), Some("Fully booked that week"));

    let result = h
        .bookings
        .decline(&teacher, pending.id, "Fully booked that week")
        .await;
    assert!(matches!(result, Err(AppError::InvalidStatus(_))));
    let result = h.bookings.cancel(&student, pending.id).await;
    assert!(matches!(result, Err(AppError::InvalidStatus(_))));
}

#[tokio::test]
async fn test_cancel_only_by_requester_while_pending() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;

    let pending = h
        .bookings
        .create(&student, booking(&teacher, SessionType::Group, "13:00", "14:00"))
        .await
        .unwrap();

    let classmate = Caller::student(Uuid::new_v4());
    let result = h.bookings.cancel(&classmate, pending.id).await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    let result = h.bookings.cancel(&teacher, pending.id).await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));

    let cancelled = h.bookings.cancel(&student, pending.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let result = h.bookings.cancel(&student, pending.id).await;
    assert!(matches!(result, Err(AppError::InvalidStatus(_))));
    let result = h
        .bookings
        .accept(&teacher, pending.id, AcceptBooking::default())
        .await;
    assert!(matches!(result, Err(AppError::InvalidStatus(_))));
}

#[tokio::test]
async fn test_accept_into_existing_series_numbers_sessions() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;
    let series = h.group_series_of(&teacher, 2).await;

    let mut accepted = Vec::new();
    for (start, end) in [("09:00", "10:00"), ("11:00", "12:00")] {
        let student = Caller::student(Uuid::new_v4());
        let pending = h
            .bookings
            .create(&student, booking(&teacher, SessionType::Group, start, end))
            .await
            .unwrap();
        let acceptance = h
            .bookings
            .accept(
                &teacher,
                pending.id,
                AcceptBooking {
                    existing_series_id: Some(series.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(acceptance.series_id, series.id);
        assert!(!acceptance.merged);
        accepted.push(acceptance);
    }

    let sessions = h.series.list_sessions(series.id).await.unwrap();
    let mut numbers: Vec<i32> = sessions.iter().map(|s| s.session_number).collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);

    // The second session seats the whole roster
    let view = h
        .sessions
        .get_session(&teacher, accepted[1].session_id)
        .await
        .unwrap();
    assert_eq!(view.participants.len(), 2);

    let summary = h.series.get_series(series.id).await.unwrap();
    assert_eq!(summary.series.status, SeriesStatus::Active);
    assert_eq!(summary.enrolled_count, 2);

    let third = Caller::student(Uuid::new_v4());
    let pending = h
        .bookings
        .create(&third, booking(&teacher, SessionType::Group, "14:00", "15:00"))
        .await
        .unwrap();
    let result = h
        .bookings
        .accept(
            &teacher,
            pending.id,
            AcceptBooking {
                existing_series_id: Some(series.id),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::SeriesFull { current: 2, max: 2 })));

    let still_pending = h.bookings.get(&teacher, pending.id).await.unwrap();
    assert_eq!(still_pending.status, BookingStatus::Pending);
    assert_eq!(h.balance(&teacher).await, dec!(900));
}

#[tokio::test]
async fn test_merge_into_full_session_is_rejected() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let a = Caller::student(Uuid::new_v4());
    let b = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;
    let series = h.group_series_of(&teacher, 1).await;

    let booking_a = h
        .bookings
        .create(&a, booking(&teacher, SessionType::Group, "10:00", "11:00"))
        .await
        .unwrap();
    let booking_b = h
        .bookings
        .create(&b, booking(&teacher, SessionType::Group, "10:00", "11:00"))
        .await
        .unwrap();

    h.bookings
        .accept(
            &teacher,
            booking_a.id,
            AcceptBooking {
                existing_series_id: Some(series.id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let result = h
        .bookings
        .accept(&teacher, booking_b.id, AcceptBooking::default())
        .await;
    assert!(matches!(result, Err(AppError::SessionFull { current: 1, max: 1 })));
    assert_eq!(h.balance(&teacher).await, dec!(950));
}

#[tokio::test]
async fn test_merge_rejects_different_offering() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let a = Caller::student(Uuid::new_v4());
    let b = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;

    let booking_a = h
        .bookings
        .create(&a, booking(&teacher, SessionType::Group, "10:00", "11:00"))
        .await
        .unwrap();
    let mut physics = booking(&teacher, SessionType::Group, "10:00", "11:00");
    physics.subject_id = Some(Uuid::new_v4());
    let booking_b = h.bookings.create(&b, physics).await.unwrap();

    h.bookings
        .accept(&teacher, booking_a.id, AcceptBooking::default())
        .await
        .unwrap();

    match h.bookings.accept(&teacher, booking_b.id, AcceptBooking::default()).await {
        Err(AppError::TimeConflict(message)) => assert!(message.contains("different subject")),
        other => panic!("expected a time conflict, got {:?}", other),
    }
    assert_eq!(h.balance(&teacher).await, dec!(950));
}

#[tokio::test]
async fn test_finalized_series_takes_no_merged_booking() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let a = Caller::student(Uuid::new_v4());
    let b = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;

    let booking_a = h
        .bookings
        .create(&a, booking(&teacher, SessionType::Group, "10:00", "11:00"))
        .await
        .unwrap();
    let booking_b = h
        .bookings
        .create(&b, booking(&teacher, SessionType::Group, "10:00", "11:00"))
        .await
        .unwrap();

    let first = h
        .bookings
        .accept(&teacher, booking_a.id, AcceptBooking::default())
        .await
        .unwrap();
    h.series.finalize(&teacher, first.series_id).await.unwrap();

    match h.bookings.accept(&teacher, booking_b.id, AcceptBooking::default()).await {
        Err(AppError::TimeConflict(message)) => assert!(message.contains("finalized")),
        other => panic!("expected a time conflict, got {:?}", other),
    }

    let summary = h.series.get_series(first.series_id).await.unwrap();
    assert_eq!(summary.enrolled_count, 1);
    let view = h.sessions.get_session(&teacher, first.session_id).await.unwrap();
    assert_eq!(view.participants, vec![a.user_id]);

    let still_pending = h.bookings.get(&teacher, booking_b.id).await.unwrap();
    assert_eq!(still_pending.status, BookingStatus::Pending);
    assert_eq!(h.balance(&teacher).await, dec!(950));
    assert_eq!(h.transactions(&teacher, TransactionType::StarDeduction).await.len(), 1);
}

#[tokio::test]
async fn test_partial_overlap_at_accept_is_already_booked() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let first = Caller::student(Uuid::new_v4());
    let second = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;
    h.fund(&teacher, dec!(1000)).await;

    let early = h
        .bookings
        .create(&first, booking(&teacher, SessionType::Individual, "10:00", "11:00"))
        .await
        .unwrap();
    let late = h
        .bookings
        .create(&second, booking(&teacher, SessionType::Individual, "10:30", "11:30"))
        .await
        .unwrap();

    h.bookings
        .accept(&teacher, early.id, AcceptBooking::default())
        .await
        .unwrap();
    let result = h.bookings.accept(&teacher, late.id, AcceptBooking::default()).await;
    assert!(matches!(result, Err(AppError::AlreadyBooked(_))));

    let still_pending = h.bookings.get(&teacher, late.id).await.unwrap();
    assert_eq!(still_pending.status, BookingStatus::Pending);
    assert_eq!(h.balance(&teacher).await, dec!(900));
}

#[tokio::test]
async fn test_invite_over_capacity_invites_nobody() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let series = h.group_series_of(&teacher, 2).await;

    let students = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    let result = h.series.invite(&teacher, series.id, students).await;
    assert!(matches!(result, Err(AppError::SeriesFull { current: 0, max: 2 })));

    let roster = h.series.list_enrollments(&teacher, series.id).await.unwrap();
    assert!(roster.is_empty());
}

#[tokio::test]
async fn test_request_to_join_twice_or_when_full() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    h.fund(&teacher, dec!(600)).await;
    let series = h.group_series_of(&teacher, 1).await;

    let student = Caller::student(Uuid::new_v4());
    h.series.request_to_join(&student, series.id, None).await.unwrap();
    let result = h.series.request_to_join(&student, series.id, None).await;
    assert!(matches!(result, Err(AppError::AlreadyRequested(_))));

    h.series
        .accept_request(&teacher, series.id, student.user_id)
        .await
        .unwrap();
    let result = h.series.request_to_join(&student, series.id, None).await;
    assert!(matches!(result, Err(AppError::AlreadyRequested(_))));

    let latecomer = Caller::student(Uuid::new_v4());
    let result = h.series.request_to_join(&latecomer, series.id, None).await;
    assert!(matches!(result, Err(AppError::SeriesFull { current: 1, max: 1 })));
}

#[tokio::test]
async fn test_add_sessions_activates_draft_series() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    h.fund(&teacher, dec!(600)).await;
    let series = h.group_series(&teacher).await;
    assert_eq!(series.status, SeriesStatus::Draft);
    let student = h.enroll(&teacher, series.id).await;

    let monday = Utc.with_ymd_and_hms(2030, 1, 7, 15, 0, 0).unwrap();
    let created = h
        .series
        .add_sessions(
            &teacher,
            series.id,
            vec![monday, monday + chrono::Duration::days(7)],
        )
        .await
        .unwrap();
    assert_eq!(
        created.iter().map(|s| s.session_number).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(created[0].end_time - created[0].start_time, chrono::Duration::minutes(90));

    let more = h
        .series
        .add_sessions(&teacher, series.id, vec![monday + chrono::Duration::days(14)])
        .await
        .unwrap();
    assert_eq!(more[0].session_number, 3);

    let summary = h.series.get_series(series.id).await.unwrap();
    assert_eq!(summary.series.status, SeriesStatus::Active);
    assert_eq!(summary.session_count, 3);

    let view = h.sessions.get_session(&teacher, more[0].id).await.unwrap();
    assert_eq!(view.participants, vec![student.user_id]);

    let stranger = Caller::teacher(Uuid::new_v4());
    let result = h
        .series
        .add_sessions(&stranger, series.id, vec![monday])
        .await;
    assert!(matches!(result, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn test_booking_accept_without_stars_stays_pending() {
    let h = Harness::new();
    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    h.open_monday(&teacher).await;

    let pending = h
        .bookings
        .create(&student, booking(&teacher, SessionType::Individual, "09:00", "10:00"))
        .await
        .unwrap();
    let result = h
        .bookings
        .accept(&teacher, pending.id, AcceptBooking::default())
        .await;
    assert!(matches!(result, Err(AppError::InsufficientBalance { .. })));

    let still_pending = h.bookings.get(&teacher, pending.id).await.unwrap();
    assert_eq!(still_pending.status, BookingStatus::Pending);
    assert!(still_pending.session_id.is_none());
    assert_eq!(h.balance(&teacher).await, Decimal::ZERO);
    assert!(h.transactions(&teacher, TransactionType::StarDeduction).await.is_empty());

    // Funding afterwards lets the same request through
    h.fund(&teacher, dec!(100)).await;
    let accepted = h
        .bookings
        .accept(&teacher, pending.id, AcceptBooking::default())
        .await
        .unwrap();
    assert_eq!(accepted.booking.status, BookingStatus::Accepted);
    assert_eq!(h.balance(&teacher).await, Decimal::ZERO);
}
