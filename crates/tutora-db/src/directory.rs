//! Identity lookups owned by user management
//!
//! Read-only queries against the profile tables; the core never writes them.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, instrument};
use tutora_core::{traits::IdentityDirectory, AppError, AppResult};
use uuid::Uuid;

/// PostgreSQL implementation of IdentityDirectory
pub struct PgIdentityDirectory {
    pool: PgPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    #[instrument(skip(self))]
    async fn is_parent_of(&self, parent_id: Uuid, student_id: Uuid) -> AppResult<bool> {
        let result: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM student_profiles
                WHERE student_id = $1 AND parent_id = $2 AND parent_verified
            )
            "#,
        )
        .bind(student_id)
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error checking parent link: {}", e);
            AppError::Database(format!("Failed to check parent link: {}", e))
        })?;

        debug!("Parent {} of {}: {}", parent_id, student_id, result.0);
        Ok(result.0)
    }

    #[instrument(skip(self))]
    async fn display_name(&self, user_id: Uuid) -> AppResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT display_name FROM user_profiles WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Database error resolving display name: {}", e);
                    AppError::Database(format!("Failed to resolve display name: {}", e))
                })?;

        Ok(row.map(|(name,)| name))
    }
}
