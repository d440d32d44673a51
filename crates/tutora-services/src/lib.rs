//! Business logic services for Tutora
//!
//! This crate holds the scheduling and ledger core: it decides whether a
//! requested slot may become a session, merges compatible group bookings,
//! runs the enrollment state machine and keeps every star debit or refund in
//! the same database transaction as the enrollment transition it pays for.
//!
//! # Architecture
//!
//! - Services are generic over a [`Store`]; each mutating operation opens one
//!   transaction, and dropping it on an early `?` rolls everything back
//! - Collaborators (identity lookups, notifications, video rooms, time) are
//!   injected as trait objects
//! - Side effects run only after commit, through the [`outbox`]
//!
//! # Services
//!
//! - `ConflictResolver` - advisory availability and overlap check
//! - `BookingService` - booking request lifecycle and acceptance placement
//! - `SeriesService` - series roster, invitations, join requests, removal
//! - `WalletLedger` - star wallet, purchases and admin review
//! - `Settlement` - couples enrollment acceptance/removal to ledger entries
//! - `SessionService` - session lifecycle and video room joins
//! - `AvailabilityService` - weekly availability windows

pub mod availability;
pub mod booking;
pub mod conflict;
pub mod enrollment;
pub mod ledger;
pub mod outbox;
pub mod sessions;
pub mod settlement;
pub mod video;

pub use availability::{AvailabilityService, SlotInput};
pub use booking::{AcceptBooking, BookingAcceptance, BookingQuery, BookingService, NewBooking};
pub use conflict::{ConflictResolver, SlotCheck};
pub use enrollment::{EnrollmentAcceptance, RemovalOutcome, SeriesService};
pub use ledger::{RefundOutcome, WalletLedger};
pub use outbox::Outbox;
pub use sessions::{JoinTicket, SessionService, SessionView};
pub use settlement::Settlement;
pub use video::{HttpRoomProvider, LocalRoomProvider};

use std::sync::Arc;
use tutora_core::models::{Caller, UserRole};
use tutora_core::traits::{Clock, IdentityDirectory, NotificationSink, Store, VideoRoomProvider};
use tutora_core::{AppConfig, AppError, AppResult};
use uuid::Uuid;

/// Every service, sharing one store and one set of collaborators
pub struct AppServices<S: Store> {
    pub conflicts: ConflictResolver<S>,
    pub bookings: BookingService<S>,
    pub series: SeriesService<S>,
    pub ledger: WalletLedger<S>,
    pub sessions: SessionService<S>,
    pub availability: AvailabilityService<S>,
}

impl<S: Store> AppServices<S> {
    pub fn new(
        store: Arc<S>,
        directory: Arc<dyn IdentityDirectory>,
        notifier: Arc<dyn NotificationSink>,
        rooms: Arc<dyn VideoRoomProvider>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> AppResult<Self> {
        let tz = config.scheduling.tz()?;
        let settlement = Settlement::new(config.stars.clone());

        Ok(Self {
            conflicts: ConflictResolver::new(store.clone(), tz),
            bookings: BookingService::new(
                store.clone(),
                directory.clone(),
                notifier.clone(),
                clock.clone(),
                settlement.clone(),
                config.scheduling.clone(),
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
                directory,
                notifier,
                rooms,
                clock.clone(),
            ),
            availability: AvailabilityService::new(store),
        })
    }
}

/// The student an operation acts for: a student acts for themselves, a parent
/// for a verified child named in `for_child_id`.
pub(crate) async fn resolve_student(
    directory: &dyn IdentityDirectory,
    caller: &Caller,
    for_child_id: Option<Uuid>,
) -> AppResult<Uuid> {
    match caller.role {
        UserRole::Student => match for_child_id {
            Some(child) if child != caller.user_id => Err(AppError::Unauthorized(
                "students can only act for themselves".to_string(),
            )),
            _ => Ok(caller.user_id),
        },
        UserRole::Parent => {
            let child = for_child_id.ok_or_else(|| {
                AppError::Validation("for_child_id is required when acting as a parent".to_string())
            })?;
            if directory.is_parent_of(caller.user_id, child).await? {
                Ok(child)
            } else {
                Err(AppError::Unauthorized(
                    "caller is not the verified parent of this student".to_string(),
                ))
            }
        }
        _ => Err(AppError::Unauthorized(format!(
            "{} accounts cannot act as a student",
            caller.role
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutora_db::MemoryDirectory;

    #[tokio::test]
    async fn test_student_acts_for_self() {
        let directory = MemoryDirectory::new();
        let caller = Caller::student(Uuid::new_v4());

        assert_eq!(
            resolve_student(&directory, &caller, None).await.unwrap(),
            caller.user_id
        );
        assert!(resolve_student(&directory, &caller, Some(Uuid::new_v4()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_parent_needs_verified_link() {
        let directory = MemoryDirectory::new();
        let parent = Caller::parent(Uuid::new_v4());
        let child = Uuid::new_v4();

        assert!(matches!(
            resolve_student(&directory, &parent, None).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resolve_student(&directory, &parent, Some(child)).await,
            Err(AppError::Unauthorized(_))
        ));

        directory.link_parent(parent.user_id, child);
        assert_eq!(
            resolve_student(&directory, &parent, Some(child)).await.unwrap(),
            child
        );
    }

    #[tokio::test]
    async fn test_teacher_cannot_act_as_student() {
        let directory = MemoryDirectory::new();
        let caller = Caller::teacher(Uuid::new_v4());
        assert!(matches!(
            resolve_student(&directory, &caller, None).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
