//! In-process store
//!
//! Implements the same transactional contract as [`PgStore`](crate::PgStore)
//! without a database: a transaction takes the store-wide lock, works on a
//! copy of the state and publishes it on commit. Dropping the transaction
//! discards the copy, which is a rollback. Used by tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tutora_core::models::{
    AvailabilitySlot, BookingFilter, BookingRequest, BookingStatus, Enrollment, EnrollmentStatus,
    Notification, Session, SessionSeries, SessionType, TransactionStatus, TransactionType, Wallet,
    WalletTransaction,
};
use tutora_core::traits::{
    AvailabilityRepository, BookingRepository, EnrollmentRepository, IdentityDirectory,
    NotificationSink, SeriesRepository, SessionRepository, Store, StoreTx, WalletRepository,
};
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    slots: Vec<AvailabilitySlot>,
    bookings: HashMap<Uuid, BookingRequest>,
    series: HashMap<Uuid, SessionSeries>,
    sessions: HashMap<Uuid, Session>,
    /// (session, student) in join order
    participants: Vec<(Uuid, Uuid)>,
    enrollments: HashMap<Uuid, Enrollment>,
    wallets: HashMap<Uuid, Wallet>,
    /// Append order doubles as creation order
    wallet_txs: Vec<WalletTransaction>,
}

/// Store keeping everything in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx { guard, working })
    }
}

/// Exclusive transaction over the in-memory state
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_teacher_schedule(&mut self, _teacher_id: Uuid) -> AppResult<()> {
        // The whole store is already held exclusively
        Ok(())
    }

    async fn commit(self) -> AppResult<()> {
        let MemoryTx { mut guard, working } = self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl AvailabilityRepository for MemoryTx {
    async fn slots_for_day(
        &mut self,
        teacher_id: Uuid,
        day_of_week: i16,
    ) -> AppResult<Vec<AvailabilitySlot>> {
        let mut slots: Vec<_> = self
            .working
            .slots
            .iter()
            .filter(|s| s.teacher_id == teacher_id && s.day_of_week == day_of_week)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.start_time);
        Ok(slots)
    }

    async fn slots_for_teacher(&mut self, teacher_id: Uuid) -> AppResult<Vec<AvailabilitySlot>> {
        let mut slots: Vec<_> = self
            .working
            .slots
            .iter()
            .filter(|s| s.teacher_id == teacher_id)
            .cloned()
            .collect();
        slots.sort_by_key(|s| (s.day_of_week, s.start_time));
        Ok(slots)
    }

    async fn replace_slots(&mut self, teacher_id: Uuid, slots: &[AvailabilitySlot]) -> AppResult<()> {
        self.working.slots.retain(|s| s.teacher_id != teacher_id);
        self.working.slots.extend_from_slice(slots);
        Ok(())
    }
}

#[async_trait]
impl BookingRepository for MemoryTx {
    async fn insert_booking(&mut self, booking: &BookingRequest) -> AppResult<()> {
        self.working.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn find_booking(&mut self, id: Uuid) -> AppResult<Option<BookingRequest>> {
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn booking_for_update(&mut self, id: Uuid) -> AppResult<Option<BookingRequest>> {
        Ok(self.working.bookings.get(&id).cloned())
    }

    async fn update_booking(&mut self, booking: &BookingRequest) -> AppResult<()> {
        match self.working.bookings.get_mut(&booking.id) {
            Some(existing) => {
                *existing = booking.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("booking {}", booking.id))),
        }
    }

    async fn accepted_bookings_on(
        &mut self,
        teacher_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<BookingRequest>> {
        let mut bookings: Vec<_> = self
            .working
            .bookings
            .values()
            .filter(|b| {
                b.teacher_id == teacher_id
                    && b.requested_date == date
                    && b.status == BookingStatus::Accepted
            })
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.start_time);
        Ok(bookings)
    }

    async fn list_bookings(
        &mut self,
        filter: &BookingFilter,
    ) -> AppResult<(Vec<BookingRequest>, i64)> {
        let mut bookings: Vec<_> = self
            .working
            .bookings
            .values()
            .filter(|b| filter.teacher_id.map_or(true, |id| b.teacher_id == id))
            .filter(|b| filter.student_id.map_or(true, |id| b.student_id == id))
            .filter(|b| filter.status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| {
            (b.requested_date, b.start_time, b.created_at).cmp(&(
                a.requested_date,
                a.start_time,
                a.created_at,
            ))
        });

        let total = bookings.len() as i64;
        let page = bookings
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl SeriesRepository for MemoryTx {
    async fn insert_series(&mut self, series: &SessionSeries) -> AppResult<()> {
        self.working.series.insert(series.id, series.clone());
        Ok(())
    }

    async fn find_series(&mut self, id: Uuid) -> AppResult<Option<SessionSeries>> {
        Ok(self.working.series.get(&id).cloned())
    }

    async fn series_for_update(&mut self, id: Uuid) -> AppResult<Option<SessionSeries>> {
        Ok(self.working.series.get(&id).cloned())
    }

    async fn update_series(&mut self, series: &SessionSeries) -> AppResult<()> {
        match self.working.series.get_mut(&series.id) {
            Some(existing) => {
                *existing = series.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("series {}", series.id))),
        }
    }
}

#[async_trait]
impl SessionRepository for MemoryTx {
    async fn insert_session(&mut self, session: &Session) -> AppResult<()> {
        self.working.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_session(&mut self, id: Uuid) -> AppResult<Option<Session>> {
        Ok(self.working.sessions.get(&id).cloned())
    }

    async fn session_for_update(&mut self, id: Uuid) -> AppResult<Option<Session>> {
        Ok(self.working.sessions.get(&id).cloned())
    }

    async fn update_session(&mut self, session: &Session) -> AppResult<()> {
        match self.working.sessions.get_mut(&session.id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("session {}", session.id))),
        }
    }

    async fn active_session_at(
        &mut self,
        teacher_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Option<(Session, SessionType)>> {
        let found = self
            .working
            .sessions
            .values()
            .filter(|s| {
                s.teacher_id == teacher_id
                    && s.start_time == start
                    && s.end_time == end
                    && s.status.is_active()
            })
            .min_by_key(|s| s.created_at)
            .cloned();

        Ok(found.map(|session| {
            let kind = session
                .series_id
                .and_then(|id| self.working.series.get(&id))
                .map(|series| series.session_type)
                .unwrap_or(SessionType::Individual);
            (session, kind)
        }))
    }

    async fn sessions_for_series(&mut self, series_id: Uuid) -> AppResult<Vec<Session>> {
        let mut sessions: Vec<_> = self
            .working
            .sessions
            .values()
            .filter(|s| s.series_id == Some(series_id))
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.session_number);
        Ok(sessions)
    }

    async fn count_sessions(&mut self, series_id: Uuid) -> AppResult<i64> {
        Ok(self
            .working
            .sessions
            .values()
            .filter(|s| s.series_id == Some(series_id))
            .count() as i64)
    }

    async fn series_has_started(&mut self, series_id: Uuid) -> AppResult<bool> {
        Ok(self
            .working
            .sessions
            .values()
            .any(|s| s.series_id == Some(series_id) && s.has_started()))
    }

    async fn add_participant(&mut self, session_id: Uuid, student_id: Uuid) -> AppResult<bool> {
        let key = (session_id, student_id);
        if self.working.participants.contains(&key) {
            return Ok(false);
        }
        self.working.participants.push(key);
        Ok(true)
    }

    async fn remove_participant(&mut self, session_id: Uuid, student_id: Uuid) -> AppResult<bool> {
        let before = self.working.participants.len();
        self.working
            .participants
            .retain(|&(s, p)| !(s == session_id && p == student_id));
        Ok(self.working.participants.len() < before)
    }

    async fn participants(&mut self, session_id: Uuid) -> AppResult<Vec<Uuid>> {
        Ok(self
            .working
            .participants
            .iter()
            .filter(|(s, _)| *s == session_id)
            .map(|(_, p)| *p)
            .collect())
    }
}

#[async_trait]
impl EnrollmentRepository for MemoryTx {
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> AppResult<()> {
        let duplicate = self.working.enrollments.values().any(|e| {
            e.series_id == enrollment.series_id && e.student_id == enrollment.student_id
        });
        if duplicate {
            return Err(AppError::Database(format!(
                "Failed to create enrollment: duplicate (series {}, student {})",
                enrollment.series_id, enrollment.student_id
            )));
        }
        self.working.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn find_enrollment(&mut self, id: Uuid) -> AppResult<Option<Enrollment>> {
        Ok(self.working.enrollments.get(&id).cloned())
    }

    async fn enrollment_for_update(
        &mut self,
        series_id: Uuid,
        student_id: Uuid,
    ) -> AppResult<Option<Enrollment>> {
        Ok(self
            .working
            .enrollments
            .values()
            .find(|e| e.series_id == series_id && e.student_id == student_id)
            .cloned())
    }

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> AppResult<()> {
        match self.working.enrollments.get_mut(&enrollment.id) {
            Some(existing) => {
                *existing = enrollment.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("enrollment {}", enrollment.id))),
        }
    }

    async fn count_enrollments(
        &mut self,
        series_id: Uuid,
        status: EnrollmentStatus,
    ) -> AppResult<i64> {
        Ok(self
            .working
            .enrollments
            .values()
            .filter(|e| e.series_id == series_id && e.status == status)
            .count() as i64)
    }

    async fn list_enrollments(&mut self, series_id: Uuid) -> AppResult<Vec<Enrollment>> {
        let mut enrollments: Vec<_> = self
            .working
            .enrollments
            .values()
            .filter(|e| e.series_id == series_id)
            .cloned()
            .collect();
        enrollments.sort_by_key(|e| e.created_at);
        Ok(enrollments)
    }
}

#[async_trait]
impl WalletRepository for MemoryTx {
    async fn ensure_wallet(&mut self, wallet: &Wallet) -> AppResult<()> {
        let exists = self
            .working
            .wallets
            .values()
            .any(|w| w.teacher_id == wallet.teacher_id);
        if !exists {
            // Always starts empty; balances only move through the ledger
            let empty = Wallet::new(wallet.teacher_id, wallet.created_at);
            self.working.wallets.insert(
                wallet.id,
                Wallet {
                    id: wallet.id,
                    ..empty
                },
            );
        }
        Ok(())
    }

    async fn find_wallet(&mut self, teacher_id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self
            .working
            .wallets
            .values()
            .find(|w| w.teacher_id == teacher_id)
            .cloned())
    }

    async fn wallet_for_update(&mut self, teacher_id: Uuid) -> AppResult<Option<Wallet>> {
        self.find_wallet(teacher_id).await
    }

    async fn wallet_by_id_for_update(&mut self, id: Uuid) -> AppResult<Option<Wallet>> {
        Ok(self.working.wallets.get(&id).cloned())
    }

    async fn update_wallet(&mut self, wallet: &Wallet) -> AppResult<()> {
        match self.working.wallets.get_mut(&wallet.id) {
            Some(existing) => {
                *existing = wallet.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("wallet {}", wallet.id))),
        }
    }

    async fn insert_wallet_transaction(&mut self, tx: &WalletTransaction) -> AppResult<()> {
        self.working.wallet_txs.push(tx.clone());
        Ok(())
    }

    async fn wallet_transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> AppResult<Option<WalletTransaction>> {
        Ok(self.working.wallet_txs.iter().find(|t| t.id == id).cloned())
    }

    async fn update_wallet_transaction(&mut self, tx: &WalletTransaction) -> AppResult<()> {
        match self.working.wallet_txs.iter_mut().find(|t| t.id == tx.id) {
            Some(existing) => {
                *existing = tx.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("wallet transaction {}", tx.id))),
        }
    }

    async fn enrollment_transactions(
        &mut self,
        enrollment_id: Uuid,
        transaction_type: TransactionType,
    ) -> AppResult<Vec<WalletTransaction>> {
        Ok(self
            .working
            .wallet_txs
            .iter()
            .rev()
            .filter(|t| {
                t.enrollment_id == Some(enrollment_id)
                    && t.transaction_type == transaction_type
                    && t.status == TransactionStatus::Completed
            })
            .cloned()
            .collect())
    }

    async fn list_wallet_transactions(
        &mut self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<WalletTransaction>, i64)> {
        let entries: Vec<_> = self
            .working
            .wallet_txs
            .iter()
            .rev()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect();
        let total = entries.len() as i64;
        let page = entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_pending_purchases(&mut self) -> AppResult<Vec<WalletTransaction>> {
        Ok(self
            .working
            .wallet_txs
            .iter()
            .filter(|t| {
                t.transaction_type == TransactionType::Purchase
                    && t.status == TransactionStatus::Pending
            })
            .cloned()
            .collect())
    }
}

/// In-memory parent links and display names
#[derive(Default)]
pub struct MemoryDirectory {
    /// student -> verified parent
    parents: RwLock<HashMap<Uuid, Uuid>>,
    names: RwLock<HashMap<Uuid, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verified parent/child link
    pub fn link_parent(&self, parent_id: Uuid, student_id: Uuid) {
        self.parents.write().insert(student_id, parent_id);
    }

    pub fn set_name(&self, user_id: Uuid, name: impl Into<String>) {
        self.names.write().insert(user_id, name.into());
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn is_parent_of(&self, parent_id: Uuid, student_id: Uuid) -> AppResult<bool> {
        Ok(self.parents.read().get(&student_id) == Some(&parent_id))
    }

    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        Ok(self.names.read().get(&user_id).cloned())
    }
}

/// Sink that keeps every notification it receives
#[derive(Default)]
pub struct MemoryNotificationSink {
    sent: SyncMutex<Vec<Notification>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn notify(&self, notification: &Notification) -> AppResult<()> {
        self.sent.lock().push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let teacher = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        tx.ensure_wallet(&Wallet::new(teacher, Utc::now())).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_wallet(teacher).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        let teacher = Uuid::new_v4();

        {
            let mut tx = store.begin().await.unwrap();
            tx.ensure_wallet(&Wallet::new(teacher, Utc::now())).await.unwrap();
        }

        let mut tx = store.begin().await.unwrap();
        assert!(tx.find_wallet(teacher).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_wallet_starts_empty() {
        let store = MemoryStore::new();
        let teacher = Uuid::new_v4();

        let mut tx = store.begin().await.unwrap();
        let mut first = Wallet::new(teacher, Utc::now());
        first.balance = dec!(10);
        tx.ensure_wallet(&first).await.unwrap();
        tx.ensure_wallet(&Wallet::new(teacher, Utc::now())).await.unwrap();

        let wallet = tx.find_wallet(teacher).await.unwrap().unwrap();
        assert_eq!(wallet.id, first.id);
        assert_eq!(wallet.balance, dec!(0));
        assert!(wallet.is_reconciled());
    }

    #[tokio::test]
    async fn test_duplicate_enrollment_rejected() {
        let store = MemoryStore::new();
        let (series, student) = (Uuid::new_v4(), Uuid::new_v4());

        let mut tx = store.begin().await.unwrap();
        tx.insert_enrollment(&Enrollment::requested(series, student, Utc::now()))
            .await
            .unwrap();
        assert!(tx
            .insert_enrollment(&Enrollment::invited(series, student, Utc::now()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_participants_idempotent() {
        let store = MemoryStore::new();
        let (session, student) = (Uuid::new_v4(), Uuid::new_v4());

        let mut tx = store.begin().await.unwrap();
        assert!(tx.add_participant(session, student).await.unwrap());
        assert!(!tx.add_participant(session, student).await.unwrap());
        assert_eq!(tx.participants(session).await.unwrap(), vec![student]);
    }

    #[tokio::test]
    async fn test_directory_parent_links() {
        let directory = MemoryDirectory::new();
        let (parent, child) = (Uuid::new_v4(), Uuid::new_v4());
        directory.link_parent(parent, child);

        assert!(directory.is_parent_of(parent, child).await.unwrap());
        assert!(!directory.is_parent_of(Uuid::new_v4(), child).await.unwrap());
    }
}
