//! The storage trait shared by the in-memory and PostgreSQL backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, VariantId};
use domain::{
    Alert, InventoryMovement, MovementKind, Order, OrderStatusHistory, Payment, ProcessedEvent,
    Refund,
};
use uuid::Uuid;

use crate::error::Result;

/// What the conditional mark-paid write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidOutcome {
    /// The order moved from `pending` to `paid` in this call.
    Transitioned,

    /// The order was already `paid`; only missing identifiers were stamped.
    AlreadyPaid,

    /// The order is in a status that can no longer be paid.
    NotPayable,
}

/// Storage operations for orders, the inventory ledger, payments, refunds,
/// idempotency markers, fulfillment shells, and the alert sink.
///
/// Every method that mutates shared state is a conditional write: it either
/// affects exactly one row (the caller won) or zero rows (a concurrent
/// caller won, or the precondition no longer holds). Callers branch on the
/// returned flag instead of holding locks.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Orders --

    /// Inserts a new order created by checkout.
    async fn insert_order(&self, order: Order) -> Result<()>;

    /// Loads an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Looks an order up by its provider checkout session id.
    async fn find_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>>;

    /// Looks an order up by its provider payment intent id.
    async fn find_order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>>;

    /// Marks an order paid. Conditional on status `pending` or `paid`;
    /// `paid_at` and the payment intent id are stamped only if unset, so
    /// repeated confirmations never move them. Reports whether this call
    /// performed the pending-to-paid transition, found the order already
    /// paid, or found it unpayable; only the caller that sees
    /// [`PaidOutcome::Transitioned`] owns the status change.
    async fn mark_order_paid(
        &self,
        id: OrderId,
        payment_intent_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<PaidOutcome>;

    /// Adds `amount` to `refunded_amount`, increments `refund_count`, and
    /// recomputes the status, guarded by
    /// `status IN ('paid','partially_refunded') AND refunded + amount <= total`.
    /// Returns true iff exactly one row was updated; false means a concurrent
    /// refund consumed the headroom or the order became unrefundable.
    async fn apply_refund(&self, id: OrderId, amount: Money) -> Result<bool>;

    /// Cancels an order, conditional on status `pending` or `paid`.
    async fn cancel_order(&self, id: OrderId) -> Result<bool>;

    /// Appends an audit row; only called when status actually changed.
    async fn append_status_history(&self, row: OrderStatusHistory) -> Result<()>;

    /// Returns the audit trail for an order, oldest first.
    async fn status_history_for_order(&self, id: OrderId) -> Result<Vec<OrderStatusHistory>>;

    // -- Inventory ledger --

    /// On-hand stock for a variant: `SUM(delta)` over all its movements,
    /// 0 if there are none. Always computed, never cached.
    async fn available_stock(&self, variant_id: VariantId) -> Result<i64>;

    /// Conditionally inserts a reservation movement with delta `-quantity`,
    /// guarded by "computed on-hand >= quantity" inside the same write.
    /// Returns the reservation movement id on success, `None` when stock is
    /// insufficient. There is no read-then-write gap to exploit.
    async fn insert_reservation(
        &self,
        variant_id: VariantId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<Option<Uuid>>;

    /// Inserts the compensating release movement for one reservation.
    /// Returns false if that reservation was already released.
    async fn release_reservation(&self, reservation_id: Uuid) -> Result<bool>;

    /// Releases every still-active reservation tagged with the order id.
    /// Returns the number reversed; idempotent (0 on the second call).
    async fn release_reservations_for_order(&self, order_id: OrderId) -> Result<usize>;

    /// Appends a plain movement (stock seeding, sales, manual corrections).
    async fn insert_adjustment(
        &self,
        variant_id: VariantId,
        delta: i64,
        kind: MovementKind,
    ) -> Result<()>;

    /// All movements for a variant, oldest first.
    async fn movements_for_variant(&self, variant_id: VariantId) -> Result<Vec<InventoryMovement>>;

    // -- Payments and refunds --

    /// Records a payment. Returns false (and writes nothing) when a row with
    /// the same `provider_payment_id` already exists.
    async fn insert_payment(&self, payment: Payment) -> Result<bool>;

    /// All payments recorded for an order.
    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;

    /// Records a refund. Returns false when the `provider_refund_id` is
    /// already recorded.
    async fn insert_refund(&self, refund: Refund) -> Result<bool>;

    // -- Event idempotency markers --

    /// Durably records a provider event id before any side effect runs.
    /// Returns false when the event was already recorded.
    async fn record_processed_event(&self, event: ProcessedEvent) -> Result<bool>;

    // -- Fulfillment shells --

    /// Ensures exactly one fulfillment shell exists for the order.
    /// Returns true if this call created it.
    async fn ensure_fulfillment(&self, order_id: OrderId) -> Result<bool>;

    // -- Alert sink --

    /// Writes an alert. Alerts carrying a dedup date are inserted at most
    /// once per `(kind, date)`; returns false when such a row already exists.
    async fn insert_alert(&self, alert: Alert) -> Result<bool>;
}
