//! Order status state machine.

use common::Money;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──► Paid ──► PartiallyRefunded ──► Refunded
///    │          │
///    └──────────┴──► Cancelled (only before fulfillment begins)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order created at checkout, payment not yet confirmed.
    #[default]
    Pending,

    /// Payment confirmed in full.
    Paid,

    /// Part of the collected amount has been refunded.
    PartiallyRefunded,

    /// The full collected amount has been refunded (terminal state).
    Refunded,

    /// Order was cancelled before fulfillment (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if a refund may be applied in this status.
    pub fn is_refundable(&self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::PartiallyRefunded)
    }

    /// Returns true if the order can be cancelled in this status.
    ///
    /// Fulfillment timing is enforced by the fulfillment module, not here.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Paid)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Refunded | OrderStatus::Cancelled)
    }

    /// Returns the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::PartiallyRefunded => "partially_refunded",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a stored status name.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "partially_refunded" => Ok(OrderStatus::PartiallyRefunded),
            "refunded" => Ok(OrderStatus::Refunded),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::InvalidValue(format!(
                "unknown order status {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derives the order status from its refund figures.
///
/// Pure function of `(refunded_amount, total_net, previous)`:
/// - `refunded_amount == 0` leaves the previous status unchanged
/// - `0 < refunded_amount < total_net` is a partial refund
/// - `refunded_amount == total_net` is a full refund
///
/// The `refunded_amount == 0` check comes first so a zero-total order
/// never flips to `Refunded` spuriously.
pub fn derive_status(refunded_amount: Money, total_net: Money, previous: OrderStatus) -> OrderStatus {
    if refunded_amount.is_zero() {
        previous
    } else if refunded_amount < total_net {
        OrderStatus::PartiallyRefunded
    } else {
        OrderStatus::Refunded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn refundable_statuses() {
        assert!(!OrderStatus::Pending.is_refundable());
        assert!(OrderStatus::Paid.is_refundable());
        assert!(OrderStatus::PartiallyRefunded.is_refundable());
        assert!(!OrderStatus::Refunded.is_refundable());
        assert!(!OrderStatus::Cancelled.is_refundable());
    }

    #[test]
    fn cancellable_statuses() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::Paid.can_cancel());
        assert!(!OrderStatus::PartiallyRefunded.can_cancel());
        assert!(!OrderStatus::Refunded.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::PartiallyRefunded.is_terminal());
        assert!(OrderStatus::Refunded.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn parse_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::PartiallyRefunded,
            OrderStatus::Refunded,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(OrderStatus::parse("disputed").is_err());
    }

    #[test]
    fn zero_refund_keeps_previous_status() {
        let status = derive_status(
            Money::zero(),
            Money::from_minor(10_000),
            OrderStatus::Paid,
        );
        assert_eq!(status, OrderStatus::Paid);
    }

    #[test]
    fn partial_refund() {
        let status = derive_status(
            Money::from_minor(6_000),
            Money::from_minor(10_000),
            OrderStatus::Paid,
        );
        assert_eq!(status, OrderStatus::PartiallyRefunded);
    }

    #[test]
    fn full_refund() {
        let status = derive_status(
            Money::from_minor(10_000),
            Money::from_minor(10_000),
            OrderStatus::PartiallyRefunded,
        );
        assert_eq!(status, OrderStatus::Refunded);
    }

    #[test]
    fn zero_total_order_stays_unchanged() {
        let status = derive_status(Money::zero(), Money::zero(), OrderStatus::Paid);
        assert_eq!(status, OrderStatus::Paid);
    }

    #[test]
    fn derivation_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(
                derive_status(
                    Money::from_minor(1),
                    Money::from_minor(10_000),
                    OrderStatus::Paid
                ),
                OrderStatus::PartiallyRefunded
            );
        }
    }
}
