//! Concurrent flows against PostgreSQL
//!
//! Run with `DATABASE_URL` pointing at a scratch database:
//! `cargo test -p tutora-services --test pg_concurrency -- --ignored`

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tutora_core::config::{DatabaseConfig, SchedulingConfig, StarsConfig};
use tutora_core::models::{Caller, NewSeries, SeriesStatus, SessionType, TransactionType};
use tutora_core::traits::{Clock, Pagination, SystemClock};
use tutora_db::{create_pool, run_migrations, MemoryDirectory, MemoryNotificationSink, PgStore};
use tutora_services::{
    AcceptBooking, AvailabilityService, BookingService, NewBooking, RefundOutcome, SeriesService,
    Settlement, SlotInput, WalletLedger,
};
use uuid::Uuid;

async fn store() -> Arc<PgStore> {
    let url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/tutora".to_string());
    let config = DatabaseConfig {
        url,
        max_connections: 8,
        min_connections: 1,
        acquire_timeout_secs: 5,
        idle_timeout_secs: 60,
        run_migrations: true,
    };
    let pool = create_pool(&config).await.unwrap();
    run_migrations(&pool).await.unwrap();
    Arc::new(PgStore::new(pool))
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_removals_refund_once() {
    let store = store().await;
    let notifier = Arc::new(MemoryNotificationSink::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let series = SeriesService::new(
        store.clone(),
        Arc::new(MemoryDirectory::new()),
        notifier.clone(),
        clock.clone(),
        Settlement::new(StarsConfig::default()),
    );
    let ledger = WalletLedger::new(store, notifier, clock);

    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    let admin = Caller::admin(Uuid::new_v4());

    let purchase = ledger.buy_credits(&teacher, dec!(600), None).await.unwrap();
    ledger.review_purchase(&admin, purchase.id, true).await.unwrap();

    let group = series
        .create_series(
            &teacher,
            NewSeries {
                title: "Concurrent removal".to_string(),
                session_type: SessionType::Group,
                subject_id: None,
                level_id: None,
                duration_hours: dec!(1),
                min_students: 1,
                max_students: 5,
                price: None,
            },
        )
        .await
        .unwrap();
    series.request_to_join(&student, group.id, None).await.unwrap();
    series
        .accept_request(&teacher, group.id, student.user_id)
        .await
        .unwrap();
    assert_eq!(ledger.wallet(&teacher).await.unwrap().balance, dec!(550));

    let (first, second) = tokio::join!(
        series.remove_student(&teacher, group.id, student.user_id),
        series.remove_student(&teacher, group.id, student.user_id),
    );
    let outcomes = [first.unwrap().refund, second.unwrap().refund];

    let refunded = outcomes.iter().filter(|o| o.is_refunded()).count();
    assert_eq!(refunded, 1);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, RefundOutcome::AlreadyRefunded)));

    let wallet = ledger.wallet(&teacher).await.unwrap();
    assert_eq!(wallet.balance, dec!(600));
    assert!(wallet.is_reconciled());

    let refunds = ledger
        .history(&teacher, &Pagination::new(1, 100))
        .await
        .unwrap()
        .data
        .into_iter()
        .filter(|t| t.transaction_type == TransactionType::Refund)
        .count();
    assert_eq!(refunds, 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_sessions_added_while_booking_joins_series() {
    let store = store().await;
    let directory = Arc::new(MemoryDirectory::new());
    let notifier = Arc::new(MemoryNotificationSink::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduling = SchedulingConfig::default();
    let tz = scheduling.tz().unwrap();
    let settlement = Settlement::new(StarsConfig::default());

    let bookings = BookingService::new(
        store.clone(),
        directory.clone(),
        notifier.clone(),
        clock.clone(),
        settlement.clone(),
        scheduling,
        tz,
    );
    let series = SeriesService::new(
        store.clone(),
        directory,
        notifier.clone(),
        clock.clone(),
        settlement,
    );
    let ledger = WalletLedger::new(store.clone(), notifier, clock);
    let availability = AvailabilityService::new(store);

    let teacher = Caller::teacher(Uuid::new_v4());
    let student = Caller::student(Uuid::new_v4());
    let admin = Caller::admin(Uuid::new_v4());

    availability
        .set(
            &teacher,
            vec![SlotInput {
                day_of_week: 1,
                start_time: "09:00".to_string(),
                end_time: "17:00".to_string(),
            }],
        )
        .await
        .unwrap();
    let purchase = ledger.buy_credits(&teacher, dec!(500), None).await.unwrap();
    ledger.review_purchase(&admin, purchase.id, true).await.unwrap();

    let group = series
        .create_series(
            &teacher,
            NewSeries {
                title: "Concurrent scheduling".to_string(),
                session_type: SessionType::Group,
                subject_id: None,
                level_id: None,
                duration_hours: dec!(1),
                min_students: 1,
                max_students: 5,
                price: None,
            },
        )
        .await
        .unwrap();

    let pending = bookings
        .create(
            &student,
            NewBooking {
                teacher_id: teacher.user_id,
                for_child_id: None,
                session_type: SessionType::Group,
                subject_id: None,
                level_id: None,
                requested_date: "2030-01-07".to_string(),
                start_time: "10:00".to_string(),
                end_time: "11:00".to_string(),
                message: None,
            },
        )
        .await
        .unwrap();

    let later = Utc.with_ymd_and_hms(2030, 1, 14, 14, 0, 0).unwrap();
    let (accepted, added) = tokio::join!(
        bookings.accept(
            &teacher,
            pending.id,
            AcceptBooking {
                existing_series_id: Some(group.id),
                ..Default::default()
            },
        ),
        series.add_sessions(&teacher, group.id, vec![later]),
    );
    accepted.unwrap();
    added.unwrap();

    let mut numbers: Vec<i32> = series
        .list_sessions(group.id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.session_number)
        .collect();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2]);

    let summary = series.get_series(group.id).await.unwrap();
    assert_eq!(summary.series.status, SeriesStatus::Active);
    assert_eq!(summary.enrolled_count, 1);
}
