//! Notification sink writing to the `notifications` table

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, instrument};
use tutora_core::{models::Notification, traits::NotificationSink, AppError, AppResult};
use uuid::Uuid;

/// Stores notifications for the client to poll
pub struct PgNotificationSink {
    pool: PgPool,
}

impl PgNotificationSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationSink for PgNotificationSink {
    #[instrument(skip(self, notification), fields(user_id = %notification.user_id, kind = %notification.kind))]
    async fn notify(&self, notification: &Notification) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, body, data, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(notification.kind.to_string())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.data)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error storing notification: {}", e);
            AppError::Database(format!("Failed to store notification: {}", e))
        })?;

        Ok(())
    }
}
