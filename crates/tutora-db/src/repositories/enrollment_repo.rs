//! Enrollment repository

use super::decode_enum;
use crate::store::PgTx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument};
use tutora_core::{
    models::{Enrollment, EnrollmentStatus, InitiatedBy},
    traits::EnrollmentRepository,
    AppError, AppResult,
};
use uuid::Uuid;

const ENROLLMENT_COLUMNS: &str = r#"
    id, series_id, student_id, initiated_by, status, requested_at, invited_at,
    accepted_at, declined_at, removed_at, created_at, updated_at
"#;

#[async_trait]
impl EnrollmentRepository for PgTx {
    #[instrument(skip(self, enrollment), fields(series_id = %enrollment.series_id, student_id = %enrollment.student_id))]
    async fn insert_enrollment(&mut self, enrollment: &Enrollment) -> AppResult<()> {
        debug!("Inserting {} enrollment", enrollment.status);

        sqlx::query(
            r#"
            INSERT INTO enrollments (
                id, series_id, student_id, initiated_by, status, requested_at, invited_at,
                accepted_at, declined_at, removed_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.series_id)
        .bind(enrollment.student_id)
        .bind(enrollment.initiated_by.to_string())
        .bind(enrollment.status.to_string())
        .bind(enrollment.requested_at)
        .bind(enrollment.invited_at)
        .bind(enrollment.accepted_at)
        .bind(enrollment.declined_at)
        .bind(enrollment.removed_at)
        .bind(enrollment.created_at)
        .bind(enrollment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error creating enrollment: {}", e);
            AppError::Database(format!("Failed to create enrollment: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_enrollment(&mut self, id: Uuid) -> AppResult<Option<Enrollment>> {
        let sql = format!("SELECT {} FROM enrollments WHERE id = $1", ENROLLMENT_COLUMNS);

        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error finding enrollment {}: {}", id, e);
                AppError::Database(format!("Failed to find enrollment: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self))]
    async fn enrollment_for_update(
        &mut self,
        series_id: Uuid,
        student_id: Uuid,
    ) -> AppResult<Option<Enrollment>> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE series_id = $1 AND student_id = $2 FOR UPDATE",
            ENROLLMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(series_id)
            .bind(student_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error locking enrollment: {}", e);
                AppError::Database(format!("Failed to find enrollment: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, enrollment), fields(enrollment_id = %enrollment.id, status = %enrollment.status))]
    async fn update_enrollment(&mut self, enrollment: &Enrollment) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE enrollments
            SET initiated_by = $2,
                status = $3,
                requested_at = $4,
                invited_at = $5,
                accepted_at = $6,
                declined_at = $7,
                removed_at = $8,
                updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(enrollment.id)
        .bind(enrollment.initiated_by.to_string())
        .bind(enrollment.status.to_string())
        .bind(enrollment.requested_at)
        .bind(enrollment.invited_at)
        .bind(enrollment.accepted_at)
        .bind(enrollment.declined_at)
        .bind(enrollment.removed_at)
        .bind(enrollment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error updating enrollment {}: {}", enrollment.id, e);
            AppError::Database(format!("Failed to update enrollment: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn count_enrollments(
        &mut self,
        series_id: Uuid,
        status: EnrollmentStatus,
    ) -> AppResult<i64> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM enrollments WHERE series_id = $1 AND status = $2")
                .bind(series_id)
                .bind(status.to_string())
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| {
                    error!("Database error counting enrollments: {}", e);
                    AppError::Database(format!("Failed to count enrollments: {}", e))
                })?;

        Ok(result.0)
    }

    #[instrument(skip(self))]
    async fn list_enrollments(&mut self, series_id: Uuid) -> AppResult<Vec<Enrollment>> {
        let sql = format!(
            "SELECT {} FROM enrollments WHERE series_id = $1 ORDER BY created_at",
            ENROLLMENT_COLUMNS
        );

        let rows = sqlx::query_as::<_, EnrollmentRow>(&sql)
            .bind(series_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error listing enrollments: {}", e);
                AppError::Database(format!("Failed to list enrollments: {}", e))
            })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct EnrollmentRow {
    id: Uuid,
    series_id: Uuid,
    student_id: Uuid,
    initiated_by: String,
    status: String,
    requested_at: Option<DateTime<Utc>>,
    invited_at: Option<DateTime<Utc>>,
    accepted_at: Option<DateTime<Utc>>,
    declined_at: Option<DateTime<Utc>>,
    removed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = AppError;

    fn try_from(row: EnrollmentRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            series_id: row.series_id,
            student_id: row.student_id,
            initiated_by: decode_enum("initiated_by", &row.initiated_by, InitiatedBy::from_str)?,
            status: decode_enum("enrollment status", &row.status, EnrollmentStatus::from_str)?,
            requested_at: row.requested_at,
            invited_at: row.invited_at,
            accepted_at: row.accepted_at,
            declined_at: row.declined_at,
            removed_at: row.removed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
