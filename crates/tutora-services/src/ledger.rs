//! Star wallet ledger
//!
//! Every balance mutation happens with the wallet row locked and writes a
//! matching transaction entry, so the cached totals always reconcile with
//! the log. Lock order across the ledger is transaction row, then wallet row.
//!
//! [`deduct_star`] and [`refund_star`] run inside the caller's transaction;
//! they are only reached through the settlement layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use tutora_core::models::{
    Caller, NotificationKind, TransactionType, UserRole, Wallet, WalletTransaction,
};
use tutora_core::traits::{
    Clock, NotificationSink, PaginatedResponse, Pagination, Store, StoreTx, WalletRepository,
};
use tutora_core::{AppError, AppResult};
use uuid::Uuid;

use crate::outbox::Outbox;

/// What happened when a removal asked for its star back
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefundOutcome {
    Refunded { transaction: WalletTransaction },
    /// No deduction was ever recorded for the enrollment
    NothingToRefund,
    /// Every deduction already has its refund
    AlreadyRefunded,
    /// A session of the series already started
    NotEligible { reason: String },
    /// The refund could not be written; the removal still stands
    Failed { message: String },
}

impl RefundOutcome {
    pub fn is_refunded(&self) -> bool {
        matches!(self, RefundOutcome::Refunded { .. })
    }
}

/// Lock the teacher's wallet, creating it empty when missing
async fn lock_wallet<T: StoreTx>(
    tx: &mut T,
    teacher_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<Wallet> {
    tx.ensure_wallet(&Wallet::new(teacher_id, now)).await?;
    tx.wallet_for_update(teacher_id).await?.ok_or_else(|| {
        error!("Wallet for teacher {} vanished after upsert", teacher_id);
        AppError::Internal(format!("wallet for teacher {} missing", teacher_id))
    })
}

/// Debit one star for an enrollment
///
/// Fails with `InsufficientBalance` without touching anything; the caller's
/// transaction is expected to roll back.
#[instrument(skip(tx))]
pub async fn deduct_star<T: StoreTx>(
    tx: &mut T,
    teacher_id: Uuid,
    cost: Decimal,
    enrollment_id: Uuid,
    series_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<WalletTransaction> {
    let mut wallet = lock_wallet(tx, teacher_id, now).await?;

    let balance_after = wallet.debit(cost, now).map_err(|e| {
        warn!(
            "Star deduction refused for teacher {}: cost {}, balance {}",
            teacher_id, cost, wallet.balance
        );
        e
    })?;
    tx.update_wallet(&wallet).await?;

    let entry = WalletTransaction::star_deduction(
        wallet.id,
        cost,
        balance_after,
        enrollment_id,
        series_id,
        now,
    );
    tx.insert_wallet_transaction(&entry).await?;

    info!(
        "Deducted {} from teacher {} for enrollment {}, balance now {}",
        cost, teacher_id, enrollment_id, balance_after
    );
    Ok(entry)
}

/// Give back the star of a removed enrollment when it is still owed
///
/// A refund is owed while the enrollment has more deductions than refunds;
/// the newest deduction's amount is returned. Fails with
/// `RefundNotEligible` once any session of the series has started.
///
/// The caller must hold the series and enrollment rows so the counts and
/// the started check cannot change before commit.
#[instrument(skip(tx))]
pub async fn refund_star<T: StoreTx>(
    tx: &mut T,
    enrollment_id: Uuid,
    series_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<RefundOutcome> {
    let deductions = tx
        .enrollment_transactions(enrollment_id, TransactionType::StarDeduction)
        .await?;
    let Some(latest) = deductions.first() else {
        debug!("No deduction recorded for enrollment {}", enrollment_id);
        return Ok(RefundOutcome::NothingToRefund);
    };

    let refunds = tx
        .enrollment_transactions(enrollment_id, TransactionType::Refund)
        .await?;
    if refunds.len() >= deductions.len() {
        debug!("Enrollment {} already refunded", enrollment_id);
        return Ok(RefundOutcome::AlreadyRefunded);
    }

    if tx.series_has_started(series_id).await? {
        return Err(AppError::RefundNotEligible(format!(
            "a session of series {} has already started",
            series_id
        )));
    }

    let mut wallet = tx
        .wallet_by_id_for_update(latest.wallet_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("wallet {}", latest.wallet_id)))?;

    let amount = latest.amount;
    let balance_after = wallet.apply_refund(amount, now);
    tx.update_wallet(&wallet).await?;

    let entry = WalletTransaction::refund(
        wallet.id,
        amount,
        balance_after,
        enrollment_id,
        Some(series_id),
        now,
    );
    tx.insert_wallet_transaction(&entry).await?;

    info!(
        "Refunded {} to teacher {} for enrollment {}, balance now {}",
        amount, wallet.teacher_id, enrollment_id, balance_after
    );
    Ok(RefundOutcome::Refunded { transaction: entry })
}

/// Wallet service for teachers and admins
pub struct WalletLedger<S: Store> {
    store: Arc<S>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl<S: Store> WalletLedger<S> {
    pub fn new(store: Arc<S>, notifier: Arc<dyn NotificationSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
        }
    }

    /// Idempotent; safe under concurrent first access
    #[instrument(skip(self))]
    pub async fn get_or_create_wallet(&self, teacher_id: Uuid) -> AppResult<Wallet> {
        let mut tx = self.store.begin().await?;
        tx.ensure_wallet(&Wallet::new(teacher_id, self.clock.now()))
            .await?;
        let wallet = tx
            .find_wallet(teacher_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("wallet for teacher {} missing", teacher_id)))?;
        tx.commit().await?;
        Ok(wallet)
    }

    /// The caller's own wallet
    pub async fn wallet(&self, caller: &Caller) -> AppResult<Wallet> {
        caller.require_role(UserRole::Teacher)?;
        self.get_or_create_wallet(caller.user_id).await
    }

    /// Record a pending purchase; the balance moves only on admin approval
    #[instrument(skip(self))]
    pub async fn buy_credits(
        &self,
        caller: &Caller,
        amount: Decimal,
        payment_reference: Option<String>,
    ) -> AppResult<WalletTransaction> {
        caller.require_role(UserRole::Teacher)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        tx.ensure_wallet(&Wallet::new(caller.user_id, now)).await?;
        let wallet = tx
            .find_wallet(caller.user_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("wallet for teacher {} missing", caller.user_id)))?;

        let purchase = WalletTransaction::purchase(wallet.id, amount, payment_reference, now)?;
        tx.insert_wallet_transaction(&purchase).await?;
        tx.commit().await?;

        info!(
            "Teacher {} requested {} in stars (transaction {})",
            caller.user_id, amount, purchase.id
        );
        Ok(purchase)
    }

    /// Approve or reject a pending purchase
    #[instrument(skip(self))]
    pub async fn review_purchase(
        &self,
        caller: &Caller,
        transaction_id: Uuid,
        approve: bool,
    ) -> AppResult<WalletTransaction> {
        caller.require_role(UserRole::Admin)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let mut purchase = tx
            .wallet_transaction_for_update(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("wallet transaction {}", transaction_id)))?;
        purchase.ensure_reviewable()?;

        let mut wallet = tx
            .wallet_by_id_for_update(purchase.wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("wallet {}", purchase.wallet_id)))?;

        let mut outbox = Outbox::new();
        if approve {
            let balance_after = wallet.apply_purchase(purchase.amount, now);
            tx.update_wallet(&wallet).await?;
            purchase.complete(balance_after, caller.user_id, now);
            outbox.push(
                wallet.teacher_id,
                NotificationKind::PurchaseApproved,
                "Stars credited",
                format!("{} DZD were added to your wallet", purchase.amount),
                json!({ "transaction_id": purchase.id, "balance": balance_after }),
            );
        } else {
            purchase.fail(caller.user_id, now);
            outbox.push(
                wallet.teacher_id,
                NotificationKind::PurchaseRejected,
                "Purchase rejected",
                format!("Your purchase of {} DZD was not approved", purchase.amount),
                json!({ "transaction_id": purchase.id }),
            );
        }
        tx.update_wallet_transaction(&purchase).await?;
        tx.commit().await?;

        info!(
            "Purchase {} {} by admin {}",
            purchase.id,
            if approve { "approved" } else { "rejected" },
            caller.user_id
        );
        outbox.dispatch(self.notifier.as_ref()).await;
        Ok(purchase)
    }

    /// The caller's transaction log, newest first
    pub async fn history(
        &self,
        caller: &Caller,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<WalletTransaction>> {
        let wallet = self.wallet(caller).await?;

        let mut tx = self.store.begin().await?;
        let (entries, total) = tx
            .list_wallet_transactions(wallet.id, pagination.limit(), pagination.offset())
            .await?;
        Ok(PaginatedResponse::new(entries, total, pagination))
    }

    /// Purchases waiting for review, oldest first
    pub async fn pending_purchases(&self, caller: &Caller) -> AppResult<Vec<WalletTransaction>> {
        caller.require_role(UserRole::Admin)?;
        let mut tx = self.store.begin().await?;
        let pending = tx.list_pending_purchases().await?;
        Ok(pending)
    }
}
