//! Payment and refund records.

use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A successfully collected charge.
///
/// One logical payment produces at most one row regardless of how many
/// times its originating event is delivered: `provider_payment_id` is
/// unique in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: OrderId,
    pub amount: Money,
    pub currency: String,
    pub provider_payment_id: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a payment record for an order.
    pub fn new(
        order_id: OrderId,
        amount: Money,
        currency: impl Into<String>,
        provider_payment_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            amount,
            currency: currency.into(),
            provider_payment_id: provider_payment_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// A refund as reported by the payment provider.
///
/// `order_id` is resolved best-effort and may be absent; the row is still
/// recorded so the provider refund id stays unique either way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: Uuid,
    pub order_id: Option<OrderId>,
    pub provider_refund_id: String,
    pub amount: Money,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Refund {
    /// Creates a refund record.
    pub fn new(
        order_id: Option<OrderId>,
        provider_refund_id: impl Into<String>,
        amount: Money,
        status: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            provider_refund_id: provider_refund_id.into(),
            amount,
            status: status.into(),
            created_at: Utc::now(),
        }
    }
}
