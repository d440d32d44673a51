//! Wallet and wallet transaction repository
//!
//! Balance mutations always go through a row locked with `FOR UPDATE`.

use super::decode_enum;
use crate::store::PgTx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, instrument};
use tutora_core::{
    models::{TransactionStatus, TransactionType, Wallet, WalletTransaction},
    traits::WalletRepository,
    AppError, AppResult,
};
use uuid::Uuid;

const WALLET_COLUMNS: &str = r#"
    id, teacher_id, balance, total_purchased, total_spent, total_refunded,
    created_at, updated_at
"#;

const TX_COLUMNS: &str = r#"
    id, wallet_id, transaction_type, status, amount, balance_after, enrollment_id,
    series_id, payment_reference, description, reviewed_by, reviewed_at,
    created_at, updated_at
"#;

impl PgTx {
    async fn fetch_wallet(&mut self, clause: &str, key: Uuid) -> AppResult<Option<Wallet>> {
        let sql = format!("SELECT {} FROM wallets WHERE {}", WALLET_COLUMNS, clause);

        let row = sqlx::query_as::<_, WalletRow>(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error finding wallet {}: {}", key, e);
                AppError::Database(format!("Failed to find wallet: {}", e))
            })?;

        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl WalletRepository for PgTx {
    #[instrument(skip(self, wallet), fields(teacher_id = %wallet.teacher_id))]
    async fn ensure_wallet(&mut self, wallet: &Wallet) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallets (id, teacher_id, balance, total_purchased, total_spent, total_refunded)
            VALUES ($1, $2, 0, 0, 0, 0)
            ON CONFLICT (teacher_id) DO NOTHING
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.teacher_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error creating wallet: {}", e);
            AppError::Database(format!("Failed to create wallet: {}", e))
        })?;

        if result.rows_affected() > 0 {
            debug!("Created wallet for teacher {}", wallet.teacher_id);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_wallet(&mut self, teacher_id: Uuid) -> AppResult<Option<Wallet>> {
        self.fetch_wallet("teacher_id = $1", teacher_id).await
    }

    #[instrument(skip(self))]
    async fn wallet_for_update(&mut self, teacher_id: Uuid) -> AppResult<Option<Wallet>> {
        self.fetch_wallet("teacher_id = $1 FOR UPDATE", teacher_id)
            .await
    }

    #[instrument(skip(self))]
    async fn wallet_by_id_for_update(&mut self, id: Uuid) -> AppResult<Option<Wallet>> {
        self.fetch_wallet("id = $1 FOR UPDATE", id).await
    }

    #[instrument(skip(self, wallet), fields(wallet_id = %wallet.id, balance = %wallet.balance))]
    async fn update_wallet(&mut self, wallet: &Wallet) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2,
                total_purchased = $3,
                total_spent = $4,
                total_refunded = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.balance)
        .bind(wallet.total_purchased)
        .bind(wallet.total_spent)
        .bind(wallet.total_refunded)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error updating wallet {}: {}", wallet.id, e);
            AppError::Database(format!("Failed to update wallet: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self, tx), fields(tx_id = %tx.id, kind = %tx.transaction_type))]
    async fn insert_wallet_transaction(&mut self, tx: &WalletTransaction) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, wallet_id, transaction_type, status, amount, balance_after, enrollment_id,
                series_id, payment_reference, description, reviewed_by, reviewed_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(tx.id)
        .bind(tx.wallet_id)
        .bind(tx.transaction_type.to_string())
        .bind(tx.status.to_string())
        .bind(tx.amount)
        .bind(tx.balance_after)
        .bind(tx.enrollment_id)
        .bind(tx.series_id)
        .bind(&tx.payment_reference)
        .bind(&tx.description)
        .bind(tx.reviewed_by)
        .bind(tx.reviewed_at)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error recording wallet transaction: {}", e);
            AppError::Database(format!("Failed to record wallet transaction: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn wallet_transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> AppResult<Option<WalletTransaction>> {
        let sql = format!(
            "SELECT {} FROM wallet_transactions WHERE id = $1 FOR UPDATE",
            TX_COLUMNS
        );

        let row = sqlx::query_as::<_, WalletTxRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error locking wallet transaction {}: {}", id, e);
                AppError::Database(format!("Failed to find wallet transaction: {}", e))
            })?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, tx), fields(tx_id = %tx.id, status = %tx.status))]
    async fn update_wallet_transaction(&mut self, tx: &WalletTransaction) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE wallet_transactions
            SET status = $2,
                balance_after = $3,
                reviewed_by = $4,
                reviewed_at = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(tx.id)
        .bind(tx.status.to_string())
        .bind(tx.balance_after)
        .bind(tx.reviewed_by)
        .bind(tx.reviewed_at)
        .bind(tx.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            error!("Database error updating wallet transaction {}: {}", tx.id, e);
            AppError::Database(format!("Failed to update wallet transaction: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn enrollment_transactions(
        &mut self,
        enrollment_id: Uuid,
        transaction_type: TransactionType,
    ) -> AppResult<Vec<WalletTransaction>> {
        let sql = format!(
            r#"
            SELECT {} FROM wallet_transactions
            WHERE enrollment_id = $1 AND transaction_type = $2 AND status = 'completed'
            ORDER BY created_at DESC
            "#,
            TX_COLUMNS
        );

        let rows = sqlx::query_as::<_, WalletTxRow>(&sql)
            .bind(enrollment_id)
            .bind(transaction_type.to_string())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error loading enrollment transactions: {}", e);
                AppError::Database(format!("Failed to load enrollment transactions: {}", e))
            })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self))]
    async fn list_wallet_transactions(
        &mut self,
        wallet_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<(Vec<WalletTransaction>, i64)> {
        let sql = format!(
            r#"
            SELECT {} FROM wallet_transactions
            WHERE wallet_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            TX_COLUMNS
        );

        let rows = sqlx::query_as::<_, WalletTxRow>(&sql)
            .bind(wallet_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error listing wallet transactions: {}", e);
                AppError::Database(format!("Failed to list wallet transactions: {}", e))
            })?;

        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM wallet_transactions WHERE wallet_id = $1")
                .bind(wallet_id)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(|e| {
                    error!("Database error counting wallet transactions: {}", e);
                    AppError::Database(format!("Failed to count wallet transactions: {}", e))
                })?;

        let entries = rows
            .into_iter()
            .map(TryInto::try_into)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((entries, total.0))
    }

    #[instrument(skip(self))]
    async fn list_pending_purchases(&mut self) -> AppResult<Vec<WalletTransaction>> {
        let sql = format!(
            r#"
            SELECT {} FROM wallet_transactions
            WHERE transaction_type = 'purchase' AND status = 'pending'
            ORDER BY created_at
            "#,
            TX_COLUMNS
        );

        let rows = sqlx::query_as::<_, WalletTxRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| {
                error!("Database error listing pending purchases: {}", e);
                AppError::Database(format!("Failed to list pending purchases: {}", e))
            })?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Helper struct for mapping database rows
#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    teacher_id: Uuid,
    balance: Decimal,
    total_purchased: Decimal,
    total_spent: Decimal,
    total_refunded: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            id: row.id,
            teacher_id: row.teacher_id,
            balance: row.balance,
            total_purchased: row.total_purchased,
            total_spent: row.total_spent,
            total_refunded: row.total_refunded,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletTxRow {
    id: Uuid,
    wallet_id: Uuid,
    transaction_type: String,
    status: String,
    amount: Decimal,
    balance_after: Option<Decimal>,
    enrollment_id: Option<Uuid>,
    series_id: Option<Uuid>,
    payment_reference: Option<String>,
    description: Option<String>,
    reviewed_by: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletTxRow> for WalletTransaction {
    type Error = AppError;

    fn try_from(row: WalletTxRow) -> AppResult<Self> {
        Ok(Self {
            id: row.id,
            wallet_id: row.wallet_id,
            transaction_type: decode_enum(
                "transaction_type",
                &row.transaction_type,
                TransactionType::from_str,
            )?,
            status: decode_enum("transaction status", &row.status, TransactionStatus::from_str)?,
            amount: row.amount,
            balance_after: row.balance_after,
            enrollment_id: row.enrollment_id,
            series_id: row.series_id,
            payment_reference: row.payment_reference,
            description: row.description,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
