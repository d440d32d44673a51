//! Domain models for Tutora
//!
//! Scheduling (availability, bookings, series, sessions, enrollments) and
//! the star ledger (wallets and their transactions).

pub mod availability;
pub mod booking;
pub mod enrollment;
pub mod notification;
pub mod series;
pub mod session;
pub mod user;
pub mod wallet;

pub use availability::{AvailabilitySlot, TimeWindow};
pub use booking::{BookingFilter, BookingRequest, BookingStatus, SessionType};
pub use enrollment::{Enrollment, EnrollmentStatus, InitiatedBy};
pub use notification::{Notification, NotificationKind};
pub use series::{NewSeries, SeriesStatus, SeriesSummary, SessionSeries};
pub use session::{Session, SessionStatus};
pub use user::{Caller, UserRole};
pub use wallet::{TransactionStatus, TransactionType, Wallet, WalletTransaction};
