//! Star wallet DTOs

use super::{ensure_positive, PaginationParams};
use rust_decimal::Decimal;
use serde::Deserialize;
use tutora_core::AppError;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BuyCreditsRequest {
    /// Amount in DZD
    pub amount: Decimal,

    /// Bank transfer or receipt reference for the reviewer
    #[validate(length(max = 100))]
    pub payment_reference: Option<String>,
}

impl BuyCreditsRequest {
    pub fn checked_amount(&self) -> Result<Decimal, AppError> {
        ensure_positive("amount", self.amount)?;
        Ok(self.amount)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewPurchaseRequest {
    pub approve: bool,
}

pub type WalletHistoryParams = PaginationParams;
