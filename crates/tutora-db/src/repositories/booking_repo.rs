//! Booking request repository

use super::decode_enum;
use crate::store::PgTx;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::{debug, error, instrument};
use tutora_core::{
    models::{BookingFilter, BookingRequest, BookingStatus, SessionType},
    traits::BookingRepository,
    AppError, AppResult,
};
use uuid::Uuid;

const BOOKING_COLUMNS: &str = r#"
    id, student_id, teacher_id, booked_by_parent_id, session_type,
    subject_id, level_id, requested_date, start_time, end_time, message,
    status, decline_reason, session_id, series_id, responded_at,
    created_at, updated_at
"#;

impl PgTx {
    async fn fetch_booking(&mut self, id: Uuid, lock: bool) -> AppResult<Option<BookingRequest>> {
        let sql = format!(
            "SELECT {} FROM booking_requests WHERE id = $1{}",
            BOOKING_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );

        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error finding booking {}: {}", id, e);
                AppError::Database(format!("Failed to find booking: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl BookingRepository for PgTx {
    #[instrument(skip(self, booking), fields(booking_id = %booking.id))]
    async fn insert_booking(&mut self, booking: &BookingRequest) -> AppResult<()> {
        debug!("Inserting booking for teacher {}", booking.teacher_id);

        sqlx::query(
            r#"
            INSERT INTO booking_requests (
                id, student_id, teacher_id, booked_by_parent_id, session_type,
                subject_id, level_id, requested_date, start_time, end_time, message,
                status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(booking.id)
        .bind(booking.student_id)
        .bind(booking.teacher_id)
        .bind(booking.booked_by_parent_id)
        .bind(booking.session_type.to_string())
        .bind(booking.subject_id)
        .bind(booking.level_id)
        .bind(booking.requested_date)
        .bind(booking.start_time)
        .bind(booking.end_time)
        .bind(&booking.message)
        .bind(booking.status.to_string())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error creating booking: {}", e);
            AppError::Database(format!("Failed to create booking: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_booking(&mut self, id: Uuid) -> AppResult<Option<BookingRequest>> {
        self.fetch_booking(id, false).await
    }

    #[instrument(skip(self))]
    async fn booking_for_update(&mut self, id: Uuid) -> AppResult<Option<BookingRequest>> {
        self.fetch_booking(id, true).await
    }

    #[instrument(skip(self, booking), fields(booking_id = %booking.id, status = %booking.status))]
    async fn update_booking(&mut self, booking: &BookingRequest) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE booking_requests
            SET status = $2,
                decline_reason = $3,
                session_id = $4,
                series_id = $5,
                responded_at = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.to_string())
        .bind(&booking.decline_reason)
        .bind(booking.session_id)
        .bind(booking.series_id)
        .bind(booking.responded_at)
        .bind(booking.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error updating booking {}: {}", booking.id, e);
            AppError::Database(format!("Failed to update booking: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn accepted_bookings_on(
        &mut self,
        teacher_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<BookingRequest>> {
        let sql = format!(
            r#"
            SELECT {} FROM booking_requests
            WHERE teacher_id = $1 AND requested_date = $2 AND status = 'accepted'
            ORDER BY start_time
            "#,
            BOOKING_COLUMNS
        );

        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(teacher_id)
            .bind(date)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error loading accepted bookings: {}", e);
                AppError::Database(format!("Failed to load accepted bookings: {}", e))
            })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    async fn list_bookings(
        &mut self,
        filter: &BookingFilter,
    ) -> AppResult<(Vec<BookingRequest>, i64)> {
        let status = filter.status.map(|s| s.to_string());

        let sql = format!(
            r#"
            SELECT {} FROM booking_requests
            WHERE ($1::uuid IS NULL OR teacher_id = $1)
                AND ($2::uuid IS NULL OR student_id = $2)
                AND ($3::text IS NULL OR status = $3)
            ORDER BY requested_date DESC, start_time DESC
            LIMIT $4 OFFSET $5
            "#,
            BOOKING_COLUMNS
        );

        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(filter.teacher_id)
            .bind(filter.student_id)
            .bind(&status)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error listing bookings: {}", e);
                AppError::Database(format!("Failed to list bookings: {}", e))
            })?;

        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM booking_requests
            WHERE ($1::uuid IS NULL OR teacher_id = $1)
                AND ($2::uuid IS NULL OR student_id = $2)
                AND ($3::text IS NULL OR status = $3)
            "#,
        )
        .bind(filter.teacher_id)
        .bind(filter.student_id)
        .bind(&status)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error counting bookings: {}", e);
            AppError::Database(format!("Failed to count bookings: {}", e))
        })?;

        let bookings = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((bookings, total.0))
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    student_id: Uuid,
    teacher_id: Uuid,
    booked_by_parent_id: Option<Uuid>,
    session_type: String,
    subject_id: Option<Uuid>,
    level_id: Option<Uuid>,
    requested_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    message: Option<String>,
    status: String,
    decline_reason: Option<String>,
    session_id: Option<Uuid>,
    series_id: Option<Uuid>,
    responded_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for BookingRequest {
    type Error = AppError;

    fn try_from(row: BookingRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            student_id: row.student_id,
            teacher_id: row.teacher_id,
            booked_by_parent_id: row.booked_by_parent_id,
            session_type: decode_enum("session_type", &row.session_type, SessionType::from_str)?,
            subject_id: row.subject_id,
            level_id: row.level_id,
            requested_date: row.requested_date,
            start_time: row.start_time,
            end_time: row.end_time,
            message: row.message,
            status: decode_enum("booking status", &row.status, BookingStatus::from_str)?,
            decline_reason: row.decline_reason,
            session_id: row.session_id,
            series_id: row.series_id,
            responded_at: row.responded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
