//! Idempotency and audit records.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::OrderStatus;

/// The durable idempotency record for an inbound provider event.
///
/// Its presence is the sole proof an event was already handled; it is
/// written before any side effect runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn new(
        provider_event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            provider_event_id: provider_event_id.into(),
            event_type: event_type.into(),
            payload,
            processed_at: Utc::now(),
        }
    }
}

/// Append-only audit row written whenever an order's status actually changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub id: Uuid,
    pub order_id: OrderId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub reason: String,
    pub provider_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderStatusHistory {
    pub fn new(
        order_id: OrderId,
        old_status: OrderStatus,
        new_status: OrderStatus,
        reason: impl Into<String>,
        provider_event_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            old_status,
            new_status,
            reason: reason.into(),
            provider_event_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_row_records_transition() {
        let row = OrderStatusHistory::new(
            OrderId::new(),
            OrderStatus::Paid,
            OrderStatus::PartiallyRefunded,
            "refund of 60.00 applied",
            Some("evt_1".to_string()),
        );
        assert_eq!(row.old_status, OrderStatus::Paid);
        assert_eq!(row.new_status, OrderStatus::PartiallyRefunded);
        assert_eq!(row.provider_event_id.as_deref(), Some("evt_1"));
    }
}
