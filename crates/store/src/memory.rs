use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, VariantId};
use domain::{
    Alert, InventoryMovement, MovementKind, MovementMetadata, Order, OrderStatus,
    OrderStatusHistory, Payment, ProcessedEvent, Refund, derive_status,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::store::{PaidOutcome, Store};

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    movements: Vec<InventoryMovement>,
    payments: Vec<Payment>,
    refunds: Vec<Refund>,
    processed_events: HashMap<String, ProcessedEvent>,
    status_history: Vec<OrderStatusHistory>,
    fulfillments: HashMap<OrderId, DateTime<Utc>>,
    alerts: Vec<Alert>,
}

impl Inner {
    fn stock(&self, variant_id: VariantId) -> i64 {
        self.movements
            .iter()
            .filter(|m| m.variant_id == variant_id)
            .map(|m| m.delta)
            .sum()
    }

    fn is_released(&self, reservation_id: Uuid) -> bool {
        self.movements.iter().any(|m| {
            m.kind == MovementKind::Release && m.metadata.reservation_id == Some(reservation_id)
        })
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Each conditional operation holds the single write lock across its whole
/// check-and-write, which simulates the single-statement atomicity the
/// PostgreSQL backend gets from the database.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of processed-event markers.
    pub async fn processed_event_count(&self) -> usize {
        self.inner.read().await.processed_events.len()
    }

    /// Returns all recorded payments.
    pub async fn payments(&self) -> Vec<Payment> {
        self.inner.read().await.payments.clone()
    }

    /// Returns all recorded refunds.
    pub async fn refunds(&self) -> Vec<Refund> {
        self.inner.read().await.refunds.clone()
    }

    /// Returns all alerts written so far.
    pub async fn alerts(&self) -> Vec<Alert> {
        self.inner.read().await.alerts.clone()
    }

    /// Returns true if a fulfillment shell exists for the order.
    pub async fn has_fulfillment(&self, order_id: OrderId) -> bool {
        self.inner.read().await.fulfillments.contains_key(&order_id)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_order(&self, order: Order) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.orders.insert(order.id, order);
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .find(|o| o.provider_checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn find_order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner
            .orders
            .values()
            .find(|o| o.provider_payment_intent_id.as_deref() == Some(payment_intent_id))
            .cloned())
    }

    async fn mark_order_paid(
        &self,
        id: OrderId,
        payment_intent_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<PaidOutcome> {
        let mut inner = self.inner.write().await;
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(PaidOutcome::NotPayable);
        };
        let transitioned = match order.status {
            OrderStatus::Pending => true,
            OrderStatus::Paid => false,
            _ => return Ok(PaidOutcome::NotPayable),
        };
        order.status = OrderStatus::Paid;
        // Stamped only once; repeated confirmations never move these.
        if order.paid_at.is_none() {
            order.paid_at = Some(paid_at);
        }
        if order.provider_payment_intent_id.is_none() {
            order.provider_payment_intent_id = payment_intent_id.map(str::to_string);
        }
        order.updated_at = Utc::now();
        Ok(if transitioned {
            PaidOutcome::Transitioned
        } else {
            PaidOutcome::AlreadyPaid
        })
    }

    async fn apply_refund(&self, id: OrderId, amount: Money) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(false);
        };
        let projected = order.refunded_amount + amount;
        if !order.status.is_refundable() || projected > order.total_net {
            return Ok(false);
        }
        order.refunded_amount = projected;
        order.refund_count += 1;
        order.status = derive_status(projected, order.total_net, order.status);
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(order) = inner.orders.get_mut(&id) else {
            return Ok(false);
        };
        if !order.status.can_cancel() {
            return Ok(false);
        }
        order.status = OrderStatus::Cancelled;
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_status_history(&self, row: OrderStatusHistory) -> Result<()> {
        self.inner.write().await.status_history.push(row);
        Ok(())
    }

    async fn status_history_for_order(&self, id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let inner = self.inner.read().await;
        Ok(inner
            .status_history
            .iter()
            .filter(|r| r.order_id == id)
            .cloned()
            .collect())
    }

    async fn available_stock(&self, variant_id: VariantId) -> Result<i64> {
        Ok(self.inner.read().await.stock(variant_id))
    }

    async fn insert_reservation(
        &self,
        variant_id: VariantId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<Option<Uuid>> {
        let mut inner = self.inner.write().await;
        // Check and insert under one write guard: the in-memory equivalent
        // of the conditional INSERT ... SELECT ... WHERE SUM(delta) >= qty.
        if inner.stock(variant_id) < i64::from(quantity) {
            return Ok(None);
        }
        let reservation_id = Uuid::new_v4();
        inner.movements.push(InventoryMovement {
            id: reservation_id,
            variant_id,
            delta: -i64::from(quantity),
            kind: MovementKind::Reservation,
            metadata: MovementMetadata::reservation(order_id, reservation_id),
            created_at: Utc::now(),
        });
        Ok(Some(reservation_id))
    }

    async fn release_reservation(&self, reservation_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(original) = inner
            .movements
            .iter()
            .find(|m| m.id == reservation_id && m.kind == MovementKind::Reservation)
            .cloned()
        else {
            return Ok(false);
        };
        if inner.is_released(reservation_id) {
            return Ok(false);
        }
        inner.movements.push(InventoryMovement {
            id: Uuid::new_v4(),
            variant_id: original.variant_id,
            delta: -original.delta,
            kind: MovementKind::Release,
            metadata: original.metadata,
            created_at: Utc::now(),
        });
        Ok(true)
    }

    async fn release_reservations_for_order(&self, order_id: OrderId) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let active: Vec<InventoryMovement> = inner
            .movements
            .iter()
            .filter(|m| {
                m.kind == MovementKind::Reservation
                    && m.metadata.order_id == Some(order_id)
                    && !inner.is_released(m.id)
            })
            .cloned()
            .collect();

        for reservation in &active {
            inner.movements.push(InventoryMovement {
                id: Uuid::new_v4(),
                variant_id: reservation.variant_id,
                delta: -reservation.delta,
                kind: MovementKind::Release,
                metadata: reservation.metadata.clone(),
                created_at: Utc::now(),
            });
        }
        Ok(active.len())
    }

    async fn insert_adjustment(
        &self,
        variant_id: VariantId,
        delta: i64,
        kind: MovementKind,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.movements.push(InventoryMovement {
            id: Uuid::new_v4(),
            variant_id,
            delta,
            kind,
            metadata: MovementMetadata::default(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn movements_for_variant(&self, variant_id: VariantId) -> Result<Vec<InventoryMovement>> {
        let inner = self.inner.read().await;
        Ok(inner
            .movements
            .iter()
            .filter(|m| m.variant_id == variant_id)
            .cloned()
            .collect())
    }

    async fn insert_payment(&self, payment: Payment) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .payments
            .iter()
            .any(|p| p.provider_payment_id == payment.provider_payment_id)
        {
            return Ok(false);
        }
        inner.payments.push(payment);
        Ok(true)
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn insert_refund(&self, refund: Refund) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .refunds
            .iter()
            .any(|r| r.provider_refund_id == refund.provider_refund_id)
        {
            return Ok(false);
        }
        inner.refunds.push(refund);
        Ok(true)
    }

    async fn record_processed_event(&self, event: ProcessedEvent) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner
            .processed_events
            .contains_key(&event.provider_event_id)
        {
            return Ok(false);
        }
        inner
            .processed_events
            .insert(event.provider_event_id.clone(), event);
        Ok(true)
    }

    async fn ensure_fulfillment(&self, order_id: OrderId) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if inner.fulfillments.contains_key(&order_id) {
            return Ok(false);
        }
        inner.fulfillments.insert(order_id, Utc::now());
        Ok(true)
    }

    async fn insert_alert(&self, alert: Alert) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if let Some(date) = alert.dedup_date
            && inner
                .alerts
                .iter()
                .any(|a| a.kind == alert.kind && a.dedup_date == Some(date))
        {
            return Ok(false);
        }
        inner.alerts.push(alert);
        Ok(true)
    }
}
