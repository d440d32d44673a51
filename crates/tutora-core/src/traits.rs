//! Common traits for storage and external collaborators
//!
//! All mutation happens inside a [`StoreTx`], one database transaction.
//! Dropping a transaction without calling [`StoreTx::commit`] rolls it back,
//! so an early `?` return never leaves partial state behind.

use crate::error::AppError;
use crate::models::{
    AvailabilitySlot, BookingFilter, BookingRequest, Enrollment, EnrollmentStatus, Notification,
    Session, SessionSeries, SessionType, TransactionType, Wallet, WalletTransaction,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Source of transactions
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Tx: StoreTx;

    /// Open a new transaction
    async fn begin(&self) -> Result<Self::Tx, AppError>;
}

/// One open transaction over every repository the core writes to
#[async_trait]
pub trait StoreTx:
    AvailabilityRepository
    + BookingRepository
    + SeriesRepository
    + SessionRepository
    + EnrollmentRepository
    + WalletRepository
    + Send
{
    /// Serialize schedule mutations for one teacher until commit/rollback
    async fn lock_teacher_schedule(&mut self, teacher_id: Uuid) -> Result<(), AppError>;

    /// Make every write of this transaction visible
    async fn commit(self) -> Result<(), AppError>;
}

/// Weekly availability windows
#[async_trait]
pub trait AvailabilityRepository: Send {
    /// Slots of a teacher on one weekday (0 = Sunday)
    async fn slots_for_day(
        &mut self,
        teacher_id: Uuid,
        day_of_week: i16,
    ) -> Result<Vec<AvailabilitySlot>, AppError>;

    async fn slots_for_teacher(&mut self, teacher_id: Uuid)
        -> Result<Vec<AvailabilitySlot>, AppError>;

    /// Replace all windows of a teacher
    async fn replace_slots(
        &mut self,
        teacher_id: Uuid,
        slots: &[AvailabilitySlot],
    ) -> Result<(), AppError>;
}

/// Booking requests
#[async_trait]
pub trait BookingRepository: Send {
    async fn insert_booking(&mut self, booking: &BookingRequest) -> Result<(), AppError>;

    async fn find_booking(&mut self, id: Uuid) -> Result<Option<BookingRequest>, AppError>;

    /// Same as `find_booking` but holds a row lock until the transaction ends
    async fn booking_for_update(&mut self, id: Uuid) -> Result<Option<BookingRequest>, AppError>;

    async fn update_booking(&mut self, booking: &BookingRequest) -> Result<(), AppError>;

    /// Accepted bookings of a teacher on a date
    async fn accepted_bookings_on(
        &mut self,
        teacher_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<BookingRequest>, AppError>;

    /// Filtered page plus total count
    async fn list_bookings(
        &mut self,
        filter: &BookingFilter,
    ) -> Result<(Vec<BookingRequest>, i64), AppError>;
}

/// Session series
#[async_trait]
pub trait SeriesRepository: Send {
    async fn insert_series(&mut self, series: &SessionSeries) -> Result<(), AppError>;

    async fn find_series(&mut self, id: Uuid) -> Result<Option<SessionSeries>, AppError>;

    async fn series_for_update(&mut self, id: Uuid) -> Result<Option<SessionSeries>, AppError>;

    async fn update_series(&mut self, series: &SessionSeries) -> Result<(), AppError>;
}

/// Sessions and their participants
#[async_trait]
pub trait SessionRepository: Send {
    async fn insert_session(&mut self, session: &Session) -> Result<(), AppError>;

    async fn find_session(&mut self, id: Uuid) -> Result<Option<Session>, AppError>;

    async fn session_for_update(&mut self, id: Uuid) -> Result<Option<Session>, AppError>;

    async fn update_session(&mut self, session: &Session) -> Result<(), AppError>;

    /// A scheduled or live session of the teacher at exactly `[start, end)`,
    /// together with the session type of its series
    async fn active_session_at(
        &mut self,
        teacher_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(Session, SessionType)>, AppError>;

    /// All sessions of a series ordered by session number
    async fn sessions_for_series(&mut self, series_id: Uuid) -> Result<Vec<Session>, AppError>;

    async fn count_sessions(&mut self, series_id: Uuid) -> Result<i64, AppError>;

    /// Whether any session of the series went live, completed or has an actual start
    async fn series_has_started(&mut self, series_id: Uuid) -> Result<bool, AppError>;

    /// Idempotent; returns false when the student was already a participant
    async fn add_participant(&mut self, session_id: Uuid, student_id: Uuid)
        -> Result<bool, AppError>;

    async fn remove_participant(
        &mut self,
        session_id: Uuid,
        student_id: Uuid,
    ) -> Result<bool, AppError>;

    async fn participants(&mut self, session_id: Uuid) -> Result<Vec<Uuid>, AppError>;
}

/// Series enrollments
#[async_trait]
pub trait EnrollmentRepository: Send {
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), AppError>;

    async fn find_enrollment(&mut self, id: Uuid) -> Result<Option<Enrollment>, AppError>;

    /// The unique (series, student) row, locked
    async fn enrollment_for_update(
        &mut self,
        series_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<Enrollment>, AppError>;

    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> Result<(), AppError>;

    async fn count_enrollments(
        &mut self,
        series_id: Uuid,
        status: EnrollmentStatus,
    ) -> Result<i64, AppError>;

    async fn list_enrollments(&mut self, series_id: Uuid) -> Result<Vec<Enrollment>, AppError>;
}

/// Wallets and the append-only transaction log
#[async_trait]
pub trait WalletRepository: Send {
    /// Insert an empty wallet unless one exists; never fails on conflict
    async fn ensure_wallet(&mut self, wallet: &Wallet) -> Result<(), AppError>;

    async fn find_wallet(&mut self, teacher_id: Uuid) -> Result<Option<Wallet>, AppError>;

    async fn wallet_for_update(&mut self, teacher_id: Uuid) -> Result<Option<Wallet>, AppError>;

    async fn wallet_by_id_for_update(&mut self, id: Uuid) -> Result<Option<Wallet>, AppError>;

    async fn update_wallet(&mut self, wallet: &Wallet) -> Result<(), AppError>;

    async fn insert_wallet_transaction(&mut self, tx: &WalletTransaction)
        -> Result<(), AppError>;

    async fn wallet_transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> Result<Option<WalletTransaction>, AppError>;

    async fn update_wallet_transaction(&mut self, tx: &WalletTransaction)
        -> Result<(), AppError>;

    /// Completed ledger entries of one type referencing an enrollment, newest first
    async fn enrollment_transactions(
        &mut self,
        enrollment_id: Uuid,
        transaction_type: TransactionType,
    ) -> Result<Vec<WalletTransaction>, AppError>;

    /// Newest first
    async fn list_wallet_transactions(
        &mut self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<WalletTransaction>, i64), AppError>;

    /// Pending purchases across all wallets, oldest first
    async fn list_pending_purchases(&mut self) -> Result<Vec<WalletTransaction>, AppError>;
}

/// Read-only lookups owned by user management
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Whether `parent_id` is the verified parent of `student_id`
    async fn is_parent_of(&self, parent_id: Uuid, student_id: Uuid) -> Result<bool, AppError>;

    async fn display_name(&self, user_id: Uuid) -> Result<Option<String>, AppError>;
}

/// External video-conferencing capability
#[async_trait]
pub trait VideoRoomProvider: Send + Sync {
    /// Create a room and return the provider's room id
    async fn create_room(
        &self,
        room_name: &str,
        kind: SessionType,
        max_participants: i32,
    ) -> Result<String, AppError>;

    /// Issue an opaque join token
    async fn generate_token(
        &self,
        room_id: &str,
        user_id: Uuid,
        display_name: &str,
        is_host: bool,
    ) -> Result<String, AppError>;

    async fn delete_room(&self, room_id: &str) -> Result<(), AppError>;
}

/// Best-effort notification delivery
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Source of the current time, injected so scheduling logic is deterministic in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(total, pagination.page, pagination.per_page),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };

        Self {
            total,
            page,
            per_page,
            total_pages,
        }
    }
}
