//! Star settlement
//!
//! An enrollment becomes `accepted` only in the transaction that also commits
//! its star deduction. Removal refunds run afterwards in their own
//! transaction: the removal stands whatever the refund outcome.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, instrument, warn};
use tutora_core::config::StarsConfig;
use tutora_core::models::{Enrollment, EnrollmentStatus, SessionSeries, SessionType, WalletTransaction};
use tutora_core::traits::{EnrollmentRepository, SeriesRepository, Store, StoreTx};
use tutora_core::{AppError, AppResult};

use crate::ledger::{self, RefundOutcome};

#[derive(Debug, Clone)]
pub struct Settlement {
    stars: StarsConfig,
}

impl Settlement {
    pub fn new(stars: StarsConfig) -> Self {
        Self { stars }
    }

    /// Flat price of one accepted enrollment
    pub fn star_cost(&self, session_type: SessionType) -> Decimal {
        self.stars.cost_for(session_type)
    }

    /// Debit the series' teacher, then flip the enrollment to `accepted`
    ///
    /// Nothing is written when the enrollment cannot be accepted or the
    /// wallet is short; on any error the caller must drop its transaction.
    #[instrument(skip(self, tx, series, enrollment), fields(enrollment_id = %enrollment.id))]
    pub async fn accept_enrollment<T: StoreTx>(
        &self,
        tx: &mut T,
        series: &SessionSeries,
        enrollment: &mut Enrollment,
        now: DateTime<Utc>,
    ) -> AppResult<WalletTransaction> {
        if !enrollment.status.can_transition_to(EnrollmentStatus::Accepted) {
            return Err(AppError::InvalidStatus(format!(
                "enrollment {} is {}, cannot be accepted",
                enrollment.id, enrollment.status
            )));
        }

        let deduction = ledger::deduct_star(
            tx,
            series.teacher_id,
            self.star_cost(series.session_type),
            enrollment.id,
            series.id,
            now,
        )
        .await?;

        enrollment.transition(EnrollmentStatus::Accepted, now)?;
        tx.update_enrollment(enrollment).await?;
        Ok(deduction)
    }

    /// Refund a removed enrollment in a transaction of its own
    ///
    /// Never fails: every outcome, including storage errors, is reported.
    #[instrument(skip(self, store, enrollment), fields(enrollment_id = %enrollment.id))]
    pub async fn settle_removal<S: Store>(
        &self,
        store: &S,
        enrollment: &Enrollment,
        now: DateTime<Utc>,
    ) -> RefundOutcome {
        match self.try_refund(store, enrollment, now).await {
            Ok(outcome) => outcome,
            Err(AppError::RefundNotEligible(reason)) => {
                warn!("Refund not eligible for enrollment {}: {}", enrollment.id, reason);
                RefundOutcome::NotEligible { reason }
            }
            Err(e) => {
                error!("Refund failed for enrollment {}: {}", enrollment.id, e);
                RefundOutcome::Failed {
                    message: if e.is_internal() {
                        "refund could not be recorded, retry the removal".to_string()
                    } else {
                        e.to_string()
                    },
                }
            }
        }
    }

    async fn try_refund<S: Store>(
        &self,
        store: &S,
        enrollment: &Enrollment,
        now: DateTime<Utc>,
    ) -> AppResult<RefundOutcome> {
        let mut tx = store.begin().await?;
        // Same order as removal and acceptance: series, enrollment, wallet.
        // Holding the series row also keeps its sessions from starting
        // until the refund commits.
        tx.series_for_update(enrollment.series_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("series {}", enrollment.series_id)))?;
        tx.enrollment_for_update(enrollment.series_id, enrollment.student_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("enrollment {}", enrollment.id)))?;

        let outcome = ledger::refund_star(&mut tx, enrollment.id, enrollment.series_id, now).await?;
        if outcome.is_refunded() {
            tx.commit().await?;
        }
        Ok(outcome)
    }
}
