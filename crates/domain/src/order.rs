//! The order record.

use chrono::{DateTime, Utc};
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::status::OrderStatus;

/// An order as created by checkout and mutated only by the state machine
/// and the refund guard. Orders are never deleted, only status-transitioned.
///
/// Invariant: `0 <= refunded_amount <= total_net` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,

    /// Order total in minor currency units.
    pub total_net: Money,

    /// Amount refunded so far; monotonically non-decreasing.
    pub refunded_amount: Money,
    pub refund_count: u32,
    pub currency: String,

    pub provider_checkout_session_id: Option<String>,
    pub provider_payment_intent_id: Option<String>,

    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending order, as checkout does.
    pub fn new(id: OrderId, total_net: Money, currency: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: OrderStatus::Pending,
            total_net,
            refunded_amount: Money::zero(),
            refund_count: 0,
            currency: currency.into(),
            provider_checkout_session_id: None,
            provider_payment_intent_id: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Attaches the provider checkout session id.
    pub fn with_checkout_session(mut self, session_id: impl Into<String>) -> Self {
        self.provider_checkout_session_id = Some(session_id.into());
        self
    }

    /// Remaining refundable headroom.
    pub fn refund_headroom(&self) -> Money {
        self.total_net - self.refunded_amount
    }
}
