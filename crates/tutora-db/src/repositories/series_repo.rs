//! Session series repository

use super::decode_enum;
use crate::store::PgTx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, instrument};
use tutora_core::{
    models::{SeriesStatus, SessionSeries, SessionType},
    traits::SeriesRepository,
    AppError, AppResult,
};
use uuid::Uuid;

const SERIES_COLUMNS: &str = r#"
    id, teacher_id, title, session_type, subject_id, level_id, duration_hours,
    min_students, max_students, price, status, finalized_at, created_at, updated_at
"#;

impl PgTx {
    async fn fetch_series(&mut self, id: Uuid, lock: bool) -> AppResult<Option<SessionSeries>> {
        let sql = format!(
            "SELECT {} FROM session_series WHERE id = $1{}",
            SERIES_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );

        let row = sqlx::query_as::<_, SeriesRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error finding series {}: {}", id, e);
                AppError::Database(format!("Failed to find series: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl SeriesRepository for PgTx {
    #[instrument(skip(self, series), fields(series_id = %series.id))]
    async fn insert_series(&mut self, series: &SessionSeries) -> AppResult<()> {
        debug!("Creating {} series for teacher {}", series.session_type, series.teacher_id);

        sqlx::query(
            r#"
            INSERT INTO session_series (
                id, teacher_id, title, session_type, subject_id, level_id, duration_hours,
                min_students, max_students, price, status, finalized_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(series.id)
        .bind(series.teacher_id)
        .bind(&series.title)
        .bind(series.session_type.to_string())
        .bind(series.subject_id)
        .bind(series.level_id)
        .bind(series.duration_hours)
        .bind(series.min_students)
        .bind(series.max_students)
        .bind(series.price)
        .bind(series.status.to_string())
        .bind(series.finalized_at)
        .bind(series.created_at)
        .bind(series.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error creating series: {}", e);
            AppError::Database(format!("Failed to create series: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_series(&mut self, id: Uuid) -> AppResult<Option<SessionSeries>> {
        self.fetch_series(id, false).await
    }

    #[instrument(skip(self))]
    async fn series_for_update(&mut self, id: Uuid) -> AppResult<Option<SessionSeries>> {
        self.fetch_series(id, true).await
    }

    #[instrument(skip(self, series), fields(series_id = %series.id, status = %series.status))]
    async fn update_series(&mut self, series: &SessionSeries) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE session_series
            SET title = $2,
                status = $3,
                price = $4,
                finalized_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(series.id)
        .bind(&series.title)
        .bind(series.status.to_string())
        .bind(series.price)
        .bind(series.finalized_at)
        .bind(series.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error updating series {}: {}", series.id, e);
            AppError::Database(format!("Failed to update series: {}", e))
        })?;

        Ok(())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SeriesRow {
    id: Uuid,
    teacher_id: Uuid,
    title: String,
    session_type: String,
    subject_id: Option<Uuid>,
    level_id: Option<Uuid>,
    duration_hours: Decimal,
    min_students: i32,
    max_students: i32,
    price: Option<Decimal>,
    status: String,
    finalized_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SeriesRow> for SessionSeries {
    type Error = AppError;

    fn try_from(row: SeriesRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            teacher_id: row.teacher_id,
            title: row.title,
            session_type: decode_enum("session_type", &row.session_type, SessionType::from_str)?,
            subject_id: row.subject_id,
            level_id: row.level_id,
            duration_hours: row.duration_hours,
            min_students: row.min_students,
            max_students: row.max_students,
            price: row.price,
            status: decode_enum("series status", &row.status, SeriesStatus::from_str)?,
            finalized_at: row.finalized_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
