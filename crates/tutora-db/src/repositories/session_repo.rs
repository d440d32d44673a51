//! Session and participant repository

use super::decode_enum;
use crate::store::PgTx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, instrument};
use tutora_core::{
    models::{Session, SessionStatus, SessionType},
    traits::SessionRepository,
    AppError, AppResult,
};
use uuid::Uuid;

const SESSION_COLUMNS: &str = r#"
    s.id, s.series_id, s.teacher_id, s.session_number, s.start_time, s.end_time,
    s.max_participants, s.status, s.actual_start, s.actual_end, s.room_id,
    s.created_at, s.updated_at
"#;

impl PgTx {
    async fn fetch_session(&mut self, id: Uuid, lock: bool) -> AppResult<Option<Session>> {
        let sql = format!(
            "SELECT {} FROM sessions s WHERE s.id = $1{}",
            SESSION_COLUMNS,
            if lock { " FOR UPDATE" } else { "" }
        );

        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error finding session {}: {}", id, e);
                AppError::Database(format!("Failed to find session: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl SessionRepository for PgTx {
    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn insert_session(&mut self, session: &Session) -> AppResult<()> {
        debug!(
            "Scheduling session #{} for teacher {}",
            session.session_number, session.teacher_id
        );

        sqlx::query(
            r#"
            INSERT INTO sessions (
                id, series_id, teacher_id, session_number, start_time, end_time,
                max_participants, status, actual_start, actual_end, room_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(session.id)
        .bind(session.series_id)
        .bind(session.teacher_id)
        .bind(session.session_number)
        .bind(session.start_time)
        .bind(session.end_time)
        .bind(session.max_participants)
        .bind(session.status.to_string())
        .bind(session.actual_start)
        .bind(session.actual_end)
        .bind(&session.room_id)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error creating session: {}", e);
            AppError::Database(format!("Failed to create session: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_session(&mut self, id: Uuid) -> AppResult<Option<Session>> {
        self.fetch_session(id, false).await
    }

    #[instrument(skip(self))]
    async fn session_for_update(&mut self, id: Uuid) -> AppResult<Option<Session>> {
        self.fetch_session(id, true).await
    }

    #[instrument(skip(self, session), fields(session_id = %session.id, status = %session.status))]
    async fn update_session(&mut self, session: &Session) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = $2,
                actual_start = $3,
                actual_end = $4,
                room_id = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(session.id)
        .bind(session.status.to_string())
        .bind(session.actual_start)
        .bind(session.actual_end)
        .bind(&session.room_id)
        .bind(session.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error updating session {}: {}", session.id, e);
            AppError::Database(format!("Failed to update session: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn active_session_at(
        &mut self,
        teacher_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Option<(Session, SessionType)>> {
        // Ad-hoc sessions without a series count as individual
        let sql = format!(
            r#"
            SELECT {}, COALESCE(ss.session_type, 'individual') AS series_type
            FROM sessions s
            LEFT JOIN session_series ss ON ss.id = s.series_id
            WHERE s.teacher_id = $1
                AND s.start_time = $2
                AND s.end_time = $3
                AND s.status IN ('scheduled', 'live')
            ORDER BY s.created_at
            LIMIT 1
            FOR UPDATE OF s
            "#,
            SESSION_COLUMNS
        );

        let row = sqlx::query_as::<_, TypedSessionRow>(&sql)
            .bind(teacher_id)
            .bind(start)
            .bind(end)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error searching sessions: {}", e);
                AppError::Database(format!("Failed to search sessions: {}", e))
            })?;

        match row {
            Some(row) => {
                let kind = decode_enum("session_type", &row.series_type, SessionType::from_str)?;
                Ok(Some((row.session.try_into()?, kind)))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn sessions_for_series(&mut self, series_id: Uuid) -> AppResult<Vec<Session>> {
        let sql = format!(
            "SELECT {} FROM sessions s WHERE s.series_id = $1 ORDER BY s.session_number",
            SESSION_COLUMNS
        );

        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(series_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error loading series sessions: {}", e);
                AppError::Database(format!("Failed to load sessions: {}", e))
            })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    async fn count_sessions(&mut self, series_id: Uuid) -> AppResult<i64> {
        let result: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE series_id = $1")
            .bind(series_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error counting sessions: {}", e);
                AppError::Database(format!("Failed to count sessions: {}", e))
            })?;

        Ok(result.0)
    }

    #[instrument(skip(self))]
    async fn series_has_started(&mut self, series_id: Uuid) -> AppResult<bool> {
        let result: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sessions
                WHERE series_id = $1
                    AND (status IN ('live', 'completed') OR actual_start IS NOT NULL)
            )
            "#,
        )
        .bind(series_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error checking series start: {}", e);
            AppError::Database(format!("Failed to check series sessions: {}", e))
        })?;

        Ok(result.0)
    }

    #[instrument(skip(self))]
    async fn add_participant(&mut self, session_id: Uuid, student_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO session_participants (session_id, student_id)
            VALUES ($1, $2)
            ON CONFLICT (session_id, student_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(student_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error adding participant: {}", e);
            AppError::Database(format!("Failed to add participant: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn remove_participant(&mut self, session_id: Uuid, student_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM session_participants WHERE session_id = $1 AND student_id = $2",
        )
        .bind(session_id)
        .bind(student_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error removing participant: {}", e);
            AppError::Database(format!("Failed to remove participant: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn participants(&mut self, session_id: Uuid) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT student_id FROM session_participants WHERE session_id = $1 ORDER BY joined_at",
        )
        .bind(session_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error loading participants: {}", e);
            AppError::Database(format!("Failed to load participants: {}", e))
        })?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    series_id: Option<Uuid>,
    teacher_id: Uuid,
    session_number: i32,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    max_participants: i32,
    status: String,
    actual_start: Option<DateTime<Utc>>,
    actual_end: Option<DateTime<Utc>>,
    room_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct TypedSessionRow {
    #[sqlx(flatten)]
    session: SessionRow,
    series_type: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = AppError;

    fn try_from(row: SessionRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            series_id: row.series_id,
            teacher_id: row.teacher_id,
            session_number: row.session_number,
            start_time: row.start_time,
            end_time: row.end_time,
            max_participants: row.max_participants,
            status: decode_enum("session status", &row.status, SessionStatus::from_str)?,
            actual_start: row.actual_start,
            actual_end: row.actual_end,
            room_id: row.room_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
