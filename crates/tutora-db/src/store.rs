//! PostgreSQL transaction store
//!
//! [`PgTx`] wraps one `sqlx` transaction; every repository trait from
//! `tutora-core` is implemented on it in `repositories/`. Row locks taken
//! with `SELECT ... FOR UPDATE` live until commit or rollback.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, instrument};
use tutora_core::traits::{Store, StoreTx};
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        let tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            AppError::Transaction(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(PgTx { tx })
    }
}

/// One open PostgreSQL transaction; rolled back on drop unless committed
pub struct PgTx {
    pub(crate) tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    #[instrument(skip(self))]
    async fn lock_teacher_schedule(&mut self, teacher_id: Uuid) -> AppResult<()> {
        debug!("Locking schedule of teacher {}", teacher_id);

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(teacher_id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Failed to lock schedule of teacher {}: {}", teacher_id, e);
                AppError::Database(format!("Failed to lock teacher schedule: {}", e))
            })?;

        Ok(())
    }

    async fn commit(self) -> AppResult<()> {
        self.tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            AppError::Transaction(format!("Failed to commit transaction: {}", e))
        })
    }
}
