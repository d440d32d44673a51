//! Post-commit notification outbox
//!
//! Operations queue notifications while their transaction is open and hand
//! the outbox to [`Outbox::dispatch`] once the commit succeeded. A rolled-back
//! operation simply drops its outbox, so nobody hears about state that never
//! existed. Delivery failures are logged and never reach the caller.

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};
use tutora_core::models::{Notification, NotificationKind};
use tutora_core::traits::NotificationSink;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        user_id: Uuid,
        kind: NotificationKind,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Value,
    ) {
        self.pending
            .push(Notification::new(user_id, kind, title, body, data));
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Deliver everything queued; returns how many deliveries succeeded
    pub async fn dispatch(self, sink: &dyn NotificationSink) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let results = join_all(self.pending.iter().map(|n| sink.notify(n))).await;

        let mut delivered = 0;
        for (notification, result) in self.pending.iter().zip(results) {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    user_id = %notification.user_id,
                    kind = %notification.kind,
                    "Notification delivery failed: {}",
                    e
                ),
            }
        }

        debug!("Dispatched {}/{} notifications", delivered, self.pending.len());
        delivered
    }
}
