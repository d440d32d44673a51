//! Teacher weekly availability

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use tutora_core::models::{availability::parse_clock, AvailabilitySlot, Caller, UserRole};
use tutora_core::traits::{AvailabilityRepository, Store, StoreTx};
use tutora_core::AppResult;
use uuid::Uuid;

/// One weekly window as submitted by a teacher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInput {
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
}

pub struct AvailabilityService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> AvailabilityService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Replace the caller's weekly windows
    ///
    /// Overlapping windows are kept as given; a request fits if any single
    /// window contains it.
    #[instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn set(&self, caller: &Caller, inputs: Vec<SlotInput>) -> AppResult<Vec<AvailabilitySlot>> {
        caller.require_role(UserRole::Teacher)?;

        let mut slots = inputs
            .iter()
            .map(|input| {
                AvailabilitySlot::new(
                    caller.user_id,
                    input.day_of_week,
                    parse_clock(&input.start_time)?,
                    parse_clock(&input.end_time)?,
                )
            })
            .collect::<AppResult<Vec<_>>>()?;
        slots.sort_by_key(|s| (s.day_of_week, s.start_time));

        let mut tx = self.store.begin().await?;
        tx.replace_slots(caller.user_id, &slots).await?;
        tx.commit().await?;

        info!("Teacher {} now has {} availability windows", caller.user_id, slots.len());
        Ok(slots)
    }

    pub async fn list(&self, teacher_id: Uuid) -> AppResult<Vec<AvailabilitySlot>> {
        let mut tx = self.store.begin().await?;
        let slots = tx.slots_for_teacher(teacher_id).await?;
        Ok(slots)
    }
}
