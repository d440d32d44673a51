//! Availability slot repository

use crate::store::PgTx;
use async_trait::async_trait;
use chrono::NaiveTime;
use tracing::{debug, error, instrument};
use tutora_core::{
    models::AvailabilitySlot, traits::AvailabilityRepository, AppError, AppResult,
};
use uuid::Uuid;

#[async_trait]
impl AvailabilityRepository for PgTx {
    #[instrument(skip(self))]
    async fn slots_for_day(
        &mut self,
        teacher_id: Uuid,
        day_of_week: i16,
    ) -> AppResult<Vec<AvailabilitySlot>> {
        debug!("Loading availability of {} on day {}", teacher_id, day_of_week);

        let rows = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, teacher_id, day_of_week, start_time, end_time
            FROM availability_slots
            WHERE teacher_id = $1 AND day_of_week = $2
            ORDER BY start_time
            "#,
        )
        .bind(teacher_id)
        .bind(day_of_week)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error loading availability: {}", e);
            AppError::Database(format!("Failed to load availability: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn slots_for_teacher(&mut self, teacher_id: Uuid) -> AppResult<Vec<AvailabilitySlot>> {
        let rows = sqlx::query_as::<_, SlotRow>(
            r#"
            SELECT id, teacher_id, day_of_week, start_time, end_time
            FROM availability_slots
            WHERE teacher_id = $1
            ORDER BY day_of_week, start_time
            "#,
        )
        .bind(teacher_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error loading availability: {}", e);
            AppError::Database(format!("Failed to load availability: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, slots), fields(count = slots.len()))]
    async fn replace_slots(&mut self, teacher_id: Uuid, slots: &[AvailabilitySlot]) -> AppResult<()> {
        sqlx::query("DELETE FROM availability_slots WHERE teacher_id = $1")
            .bind(teacher_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error clearing availability: {}", e);
                AppError::Database(format!("Failed to clear availability: {}", e))
            })?;

        for slot in slots {
            sqlx::query(
                r#"
                INSERT INTO availability_slots (id, teacher_id, day_of_week, start_time, end_time)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(slot.id)
            .bind(slot.teacher_id)
            .bind(slot.day_of_week)
            .bind(slot.start_time)
            .bind(slot.end_time)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error inserting availability: {}", e);
                AppError::Database(format!("Failed to insert availability: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SlotRow {
    id: Uuid,
    teacher_id: Uuid,
    day_of_week: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

impl From<SlotRow> for AvailabilitySlot {
    fn from(row: SlotRow) -> Self {
        Self {
            id: row.id,
            teacher_id: row.teacher_id,
            day_of_week: row.day_of_week,
            start_time: row.start_time,
            end_time: row.end_time,
        }
    }
}
