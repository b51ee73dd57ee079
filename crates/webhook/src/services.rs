//! Outbound collaborators triggered by webhook processing.

use async_trait::async_trait;
use common::OrderId;
use std::sync::{Arc, RwLock};

#[derive(Debug, thiserror::Error)]
#[error("notification failed: {0}")]
pub struct NotificationError(pub String);

/// Sends customer-facing notifications. Delivery is fire-and-forget from
/// the processor's point of view: a failure is logged, never propagated.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_payment_confirmation(
        &self,
        order_id: OrderId,
    ) -> Result<(), NotificationError>;
}

/// In-memory notification service for tests, with a failure switch.
#[derive(Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<NotificationState>>,
}

#[derive(Default)]
struct NotificationState {
    sent: Vec<OrderId>,
    fail_on_send: bool,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    pub fn sent(&self) -> Vec<OrderId> {
        self.state.read().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send_payment_confirmation(
        &self,
        order_id: OrderId,
    ) -> Result<(), NotificationError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_send {
            return Err(NotificationError("simulated send failure".to_string()));
        }
        state.sent.push(order_id);
        Ok(())
    }
}

/// Notification service that only logs. Used until a real provider is wired
/// up; keeps the processor's notification path exercised in production.
#[derive(Clone, Default)]
pub struct TracingNotificationService;

#[async_trait]
impl NotificationService for TracingNotificationService {
    async fn send_payment_confirmation(
        &self,
        order_id: OrderId,
    ) -> Result<(), NotificationError> {
        tracing::info!(%order_id, "payment confirmation notification");
        Ok(())
    }
}
