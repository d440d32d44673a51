//! Star wallet and transaction models
//!
//! A teacher's wallet holds prepaid star credits (DZD). The balance is a
//! cached projection of the transaction log:
//! `balance == total_purchased - total_spent + total_refunded`.

use crate::error::AppError;
use crate::AppResult;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One wallet per teacher, created lazily on first access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub teacher_id: Uuid,
    pub balance: Decimal,
    pub total_purchased: Decimal,
    pub total_spent: Decimal,
    pub total_refunded: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Empty wallet for a teacher
    pub fn new(teacher_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            teacher_id,
            balance: Decimal::ZERO,
            total_purchased: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            total_refunded: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check that the cached balance matches the running totals
    pub fn is_reconciled(&self) -> bool {
        self.balance == self.total_purchased - self.total_spent + self.total_refunded
            && self.balance >= Decimal::ZERO
    }

    /// Credit an approved purchase, returning the new balance
    pub fn apply_purchase(&mut self, amount: Decimal, now: DateTime<Utc>) -> Decimal {
        self.balance += amount;
        self.total_purchased += amount;
        self.updated_at = now;
        self.balance
    }

    /// Debit one star. Never lets the balance go negative.
    pub fn debit(&mut self, cost: Decimal, now: DateTime<Utc>) -> AppResult<Decimal> {
        if self.balance < cost {
            return Err(AppError::InsufficientBalance {
                required: cost.to_string(),
                available: self.balance.to_string(),
            });
        }
        self.balance -= cost;
        self.total_spent += cost;
        self.updated_at = now;
        Ok(self.balance)
    }

    /// Give back a previously debited amount
    pub fn apply_refund(&mut self, amount: Decimal, now: DateTime<Utc>) -> Decimal {
        self.balance += amount;
        self.total_refunded += amount;
        self.updated_at = now;
        self.balance
    }
}

/// Wallet transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Credits bought by the teacher, pending admin approval
    Purchase,
    /// One star debited for an accepted enrollment
    StarDeduction,
    /// Star returned after an eligible removal
    Refund,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Purchase => write!(f, "purchase"),
            TransactionType::StarDeduction => write!(f, "star_deduction"),
            TransactionType::Refund => write!(f, "refund"),
        }
    }
}

impl TransactionType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "purchase" => Some(TransactionType::Purchase),
            "star_deduction" => Some(TransactionType::StarDeduction),
            "refund" => Some(TransactionType::Refund),
            _ => None,
        }
    }
}

/// Wallet transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "pending"),
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl TransactionStatus {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

/// Append-only wallet log entry
///
/// `amount` is always positive; the type carries the direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub amount: Decimal,
    /// Balance once this entry took effect; unset while a purchase is pending
    pub balance_after: Option<Decimal>,
    pub enrollment_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    /// Payment-provider reference supplied with a purchase
    pub payment_reference: Option<String>,
    pub description: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    fn entry(
        wallet_id: Uuid,
        transaction_type: TransactionType,
        status: TransactionStatus,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            transaction_type,
            status,
            amount,
            balance_after: None,
            enrollment_id: None,
            series_id: None,
            payment_reference: None,
            description: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending purchase; the balance is untouched until approval
    pub fn purchase(
        wallet_id: Uuid,
        amount: Decimal,
        payment_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidInput(
                "purchase amount must be positive".to_string(),
            ));
        }
        let mut tx = Self::entry(
            wallet_id,
            TransactionType::Purchase,
            TransactionStatus::Pending,
            amount,
            now,
        );
        tx.payment_reference = payment_reference;
        tx.description = Some(format!("Purchase of {} DZD in stars", amount));
        Ok(tx)
    }

    /// Completed debit tied to an enrollment
    pub fn star_deduction(
        wallet_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
        enrollment_id: Uuid,
        series_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::entry(
            wallet_id,
            TransactionType::StarDeduction,
            TransactionStatus::Completed,
            amount,
            now,
        );
        tx.balance_after = Some(balance_after);
        tx.enrollment_id = Some(enrollment_id);
        tx.series_id = Some(series_id);
        tx.description = Some("Star deducted for accepted enrollment".to_string());
        tx
    }

    /// Completed credit returning a deduction
    pub fn refund(
        wallet_id: Uuid,
        amount: Decimal,
        balance_after: Decimal,
        enrollment_id: Uuid,
        series_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut tx = Self::entry(
            wallet_id,
            TransactionType::Refund,
            TransactionStatus::Completed,
            amount,
            now,
        );
        tx.balance_after = Some(balance_after);
        tx.enrollment_id = Some(enrollment_id);
        tx.series_id = series_id;
        tx.description = Some("Star refunded after removal".to_string());
        tx
    }

    /// Fails with `AlreadyProcessed` unless this is a pending purchase
    pub fn ensure_reviewable(&self) -> AppResult<()> {
        if self.transaction_type != TransactionType::Purchase {
            return Err(AppError::InvalidInput(format!(
                "transaction {} is a {}, only purchases are reviewed",
                self.id, self.transaction_type
            )));
        }
        if self.status != TransactionStatus::Pending {
            return Err(AppError::AlreadyProcessed(format!(
                "transaction {} is already {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn complete(&mut self, balance_after: Decimal, reviewer: Uuid, now: DateTime<Utc>) {
        self.status = TransactionStatus::Completed;
        self.balance_after = Some(balance_after);
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.updated_at = now;
    }

    pub fn fail(&mut self, reviewer: Uuid, now: DateTime<Utc>) {
        self.status = TransactionStatus::Failed;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(now);
        self.updated_at = now;
    }

    /// Whether this entry moved the balance
    pub fn is_settled(&self) -> bool {
        self.status == TransactionStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn funded(amount: Decimal) -> Wallet {
        let mut w = Wallet::new(Uuid::new_v4(), Utc::now());
        w.apply_purchase(amount, Utc::now());
        w
    }

    #[test]
    fn test_debit_and_refund() {
        let mut w = funded(dec!(600));

        assert_eq!(w.debit(dec!(50), Utc::now()).unwrap(), dec!(550));
        assert_eq!(w.total_spent, dec!(50));

        assert_eq!(w.apply_refund(dec!(50), Utc::now()), dec!(600));
        assert_eq!(w.total_refunded, dec!(50));
        assert!(w.is_reconciled());
    }

    #[test]
    fn test_debit_insufficient_balance() {
        let mut w = funded(dec!(30));
        let err = w.debit(dec!(50), Utc::now()).unwrap_err();

        assert!(matches!(err, AppError::InsufficientBalance { .. }));
        assert_eq!(w.balance, dec!(30));
        assert_eq!(w.total_spent, Decimal::ZERO);
    }

    #[test]
    fn test_debit_exact_balance() {
        let mut w = funded(dec!(100));
        assert_eq!(w.debit(dec!(100), Utc::now()).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_purchase_review() {
        let now = Utc::now();
        let mut tx = WalletTransaction::purchase(Uuid::new_v4(), dec!(1000), None, now).unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.balance_after.is_none());
        assert!(tx.ensure_reviewable().is_ok());

        tx.complete(dec!(1000), Uuid::new_v4(), now);
        assert!(matches!(
            tx.ensure_reviewable(),
            Err(AppError::AlreadyProcessed(_))
        ));
    }

    #[test]
    fn test_purchase_rejects_non_positive() {
        assert!(WalletTransaction::purchase(Uuid::new_v4(), dec!(0), None, Utc::now()).is_err());
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!(
            TransactionType::from_str("star_deduction"),
            Some(TransactionType::StarDeduction)
        );
        assert_eq!(TransactionType::StarDeduction.to_string(), "star_deduction");
        assert_eq!(TransactionStatus::from_str("done"), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Purchase(u32),
        Debit(u32),
        Refund(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..5_000).prop_map(Op::Purchase),
            (1u32..500).prop_map(Op::Debit),
            (1u32..500).prop_map(Op::Refund),
        ]
    }

    proptest! {
        #[test]
        fn prop_wallet_stays_reconciled(ops in proptest::collection::vec(op(), 0..64)) {
            let mut w = Wallet::new(Uuid::new_v4(), Utc::now());
            let now = Utc::now();

            for op in ops {
                match op {
                    Op::Purchase(a) => { w.apply_purchase(Decimal::from(a), now); }
                    Op::Debit(a) => {
                        let before = w.balance;
                        if w.debit(Decimal::from(a), now).is_err() {
                            prop_assert_eq!(w.balance, before);
                        }
                    }
                    Op::Refund(a) => { w.apply_refund(Decimal::from(a), now); }
                }
                prop_assert!(w.is_reconciled());
            }
        }
    }
}
