//! The webhook processor: verification, idempotency, and event dispatch.

use chrono::Utc;
use common::{Money, OrderId};
use domain::{
    Alert, AlertKind, AlertSeverity, Order, OrderStatus, OrderStatusHistory, Payment,
    ProcessedEvent, Refund,
};
use serde_json::Value;
use store::{PaidOutcome, Store};
use uuid::Uuid;

use crate::error::{Result, WebhookError};
use crate::event::ProviderEvent;
use crate::services::NotificationService;
use crate::signature::{SignatureError, SignatureVerifier};

/// What happened to a delivery that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The event was handled and its side effects ran.
    Processed,

    /// The event id was already recorded; nothing ran.
    Duplicate,

    /// The event was recorded but carries nothing actionable (unknown type,
    /// or an object no known order matches).
    Ignored,
}

/// Processes inbound payment provider webhooks.
///
/// Every accepted delivery follows the same shape:
///
/// ```text
/// verify signature -> parse envelope -> record event id -> dispatch
///                                        |
///                                        already recorded? return Duplicate
/// ```
///
/// The event id is recorded durably BEFORE any side effect runs, so a
/// redelivered event short-circuits no matter how far its first delivery
/// got. Per-entity effects (payments, refunds, fulfillments) carry their
/// own unique markers as a second line of defense.
pub struct WebhookProcessor<S, N> {
    store: S,
    verifier: Option<SignatureVerifier>,
    notifier: N,
}

impl<S: Store, N: NotificationService> WebhookProcessor<S, N> {
    /// Creates a processor. `verifier` is `None` only when no signing secret
    /// is configured, in which case every delivery is rejected loudly
    /// rather than accepted unverified.
    pub fn new(store: S, verifier: Option<SignatureVerifier>, notifier: N) -> Self {
        Self {
            store,
            verifier,
            notifier,
        }
    }

    /// Handles one raw delivery.
    #[tracing::instrument(
        skip_all,
        fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
    )]
    pub async fn process(&self, payload: &[u8], signature_header: Option<&str>) -> Result<Outcome> {
        let verifier = self.verifier.as_ref().ok_or(WebhookError::MissingSecret)?;
        let header = signature_header
            .filter(|h| !h.is_empty())
            .ok_or(SignatureError::MissingHeader)?;
        verifier.verify(payload, header)?;

        let event = ProviderEvent::parse(payload)?;
        tracing::Span::current()
            .record("event_id", event.id.as_str())
            .record("event_type", event.event_type.as_str());

        let marker = ProcessedEvent::new(&event.id, &event.event_type, event.payload.clone());
        if !self.store.record_processed_event(marker).await? {
            metrics::counter!("webhook_events_duplicate_total").increment(1);
            tracing::info!("duplicate delivery, skipping");
            return Ok(Outcome::Duplicate);
        }
        metrics::counter!("webhook_events_total", "type" => event.event_type.clone())
            .increment(1);

        match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_payment_confirmation(&event).await,
            "charge.refunded" => self.handle_refunds(&event).await,
            "charge.dispute.created" => self.handle_dispute(&event).await,
            other => {
                tracing::debug!(event_type = other, "unhandled event type");
                Ok(Outcome::Ignored)
            }
        }
    }

    /// Confirms payment for the order behind a completed checkout session.
    async fn handle_payment_confirmation(&self, event: &ProviderEvent) -> Result<Outcome> {
        let object = event.object();
        let session_id = object.get("id").and_then(Value::as_str);
        let payment_intent = object.get("payment_intent").and_then(Value::as_str);

        let Some(order) = self
            .resolve_order(session_id, payment_intent, object)
            .await?
        else {
            tracing::warn!("payment confirmation matches no known order");
            return Ok(Outcome::Ignored);
        };

        // Only the call that actually performed the transition appends the
        // audit row; a concurrent confirmation with a distinct event id
        // sees AlreadyPaid and writes nothing.
        match self
            .store
            .mark_order_paid(order.id, payment_intent, Utc::now())
            .await?
        {
            PaidOutcome::Transitioned => {
                self.store
                    .append_status_history(OrderStatusHistory::new(
                        order.id,
                        OrderStatus::Pending,
                        OrderStatus::Paid,
                        "payment confirmed by provider",
                        Some(event.id.clone()),
                    ))
                    .await?;
            }
            PaidOutcome::AlreadyPaid => {}
            PaidOutcome::NotPayable => {
                // Cancelled or refunded in the meantime. The payment is
                // still a fact and gets recorded below, but the status
                // stays put.
                tracing::warn!(order_id = %order.id, status = %order.status, "order no longer payable");
            }
        }

        let amount = object
            .get("amount_total")
            .and_then(Value::as_i64)
            .map(Money::from_minor)
            .unwrap_or(order.total_net);
        let currency = object
            .get("currency")
            .and_then(Value::as_str)
            .unwrap_or(&order.currency);
        let provider_payment_id = payment_intent.or(session_id).unwrap_or(&event.id);

        let payment = Payment::new(order.id, amount, currency, provider_payment_id);
        if !self.store.insert_payment(payment).await? {
            // Payment already on file from an earlier event; no second
            // fulfillment, no second notification.
            tracing::info!(order_id = %order.id, provider_payment_id, "payment already recorded");
            return Ok(Outcome::Processed);
        }
        metrics::counter!("payments_recorded_total").increment(1);

        self.store.ensure_fulfillment(order.id).await?;

        if let Err(error) = self.notifier.send_payment_confirmation(order.id).await {
            tracing::warn!(%error, order_id = %order.id, "confirmation notification failed");
        }

        Ok(Outcome::Processed)
    }

    /// Applies every refund carried by a `charge.refunded` event.
    async fn handle_refunds(&self, event: &ProviderEvent) -> Result<Outcome> {
        let object = event.object();
        let payment_intent = object.get("payment_intent").and_then(Value::as_str);

        let empty = Vec::new();
        let refunds = object
            .pointer("/refunds/data")
            .and_then(Value::as_array)
            .unwrap_or(&empty);

        // The event id is already durably recorded, so this is the only
        // chance each bundled refund gets: a failing one must not starve
        // its siblings. The first failure is reported after the loop.
        let mut first_failure: Option<WebhookError> = None;
        for refund_object in refunds {
            let Some(refund_id) = refund_object.get("id").and_then(Value::as_str) else {
                tracing::warn!("refund entry has no id, skipping");
                continue;
            };
            let amount = refund_object
                .get("amount")
                .and_then(Value::as_i64)
                .map(Money::from_minor)
                .unwrap_or_else(Money::zero);
            if !amount.is_positive() {
                tracing::warn!(refund_id, %amount, "refund amount is not positive, skipping");
                continue;
            }
            let refund_status = refund_object
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("succeeded");

            let order = self
                .resolve_order(None, payment_intent, refund_object)
                .await?;

            // Record first. The provider refund id is unique, so a replayed
            // refund inside a fresh event is caught here.
            let refund = Refund::new(
                order.as_ref().map(|o| o.id),
                refund_id,
                amount,
                refund_status,
            );
            if !self.store.insert_refund(refund).await? {
                tracing::info!(refund_id, "refund already recorded, skipping");
                continue;
            }

            let Some(order) = order else {
                tracing::warn!(refund_id, "refund matches no known order, recorded unattached");
                continue;
            };

            if let Err(error) = self
                .apply_refund_to_order(event, order.id, refund_id, amount)
                .await
            {
                tracing::warn!(%error, refund_id, "refund not applied");
                first_failure.get_or_insert(error);
            }
        }

        match first_failure {
            Some(error) => Err(error),
            None => Ok(Outcome::Processed),
        }
    }

    /// Applies one recorded refund against an order, enforcing the
    /// never-exceed-total invariant.
    async fn apply_refund_to_order(
        &self,
        event: &ProviderEvent,
        order_id: OrderId,
        refund_id: &str,
        amount: Money,
    ) -> Result<()> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(store::StoreError::OrderNotFound(order_id))?;

        if !order.status.is_refundable() {
            self.raise_alert(Alert::new(
                AlertKind::RefundOnUnrefundableOrder,
                AlertSeverity::Critical,
                format!(
                    "refund {refund_id} of {amount} arrived for order {order_id} in status {}",
                    order.status
                ),
            ))
            .await;
            tracing::warn!(refund_id, %order_id, status = %order.status, "order not refundable");
            return Ok(());
        }

        let projected = order.refunded_amount + amount;
        if projected > order.total_net {
            self.raise_alert(Alert::new(
                AlertKind::RefundExceedsTotal,
                AlertSeverity::Critical,
                format!(
                    "refund {refund_id} of {amount} would take order {order_id} to {projected}, \
                     past its total {}",
                    order.total_net
                ),
            ))
            .await;
            return Err(WebhookError::RefundExceedsTotal {
                order_id,
                amount,
                total_net: order.total_net,
            });
        }

        if !self.store.apply_refund(order_id, amount).await? {
            // Lost the race: another refund consumed the headroom between
            // our read and the guarded update.
            self.raise_alert(Alert::new(
                AlertKind::ConcurrentRefundRejected,
                AlertSeverity::Critical,
                format!("refund {refund_id} of {amount} rejected by the guard on order {order_id}"),
            ))
            .await;
            return Err(WebhookError::ConcurrentRefundRejected(order_id));
        }
        metrics::counter!("refunds_recorded_total").increment(1);

        let updated = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(store::StoreError::OrderNotFound(order_id))?;
        if updated.status != order.status {
            self.store
                .append_status_history(OrderStatusHistory::new(
                    order_id,
                    order.status,
                    updated.status,
                    format!("refund {refund_id} of {amount} applied"),
                    Some(event.id.clone()),
                ))
                .await?;
        }

        Ok(())
    }

    /// Records a dispute for audit. Disputes never move order status; the
    /// money is only provisionally held by the provider at this point.
    async fn handle_dispute(&self, event: &ProviderEvent) -> Result<Outcome> {
        let object = event.object();
        let dispute_id = object.get("id").and_then(Value::as_str).unwrap_or("unknown");
        let reason = object
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("unspecified");

        tracing::warn!(dispute_id, reason, "dispute opened");
        self.raise_alert(Alert::new(
            AlertKind::Chargeback,
            AlertSeverity::Critical,
            format!("dispute {dispute_id} opened ({reason})"),
        ))
        .await;
        metrics::counter!("disputes_total").increment(1);

        Ok(Outcome::Processed)
    }

    /// Resolves the order an event object refers to. Tried in order:
    /// checkout session id, payment intent id, then an `order_id` hint in
    /// the object's metadata.
    async fn resolve_order(
        &self,
        session_id: Option<&str>,
        payment_intent: Option<&str>,
        object: &Value,
    ) -> Result<Option<Order>> {
        if let Some(session_id) = session_id {
            if let Some(order) = self.store.find_order_by_checkout_session(session_id).await? {
                return Ok(Some(order));
            }
        }
        if let Some(payment_intent) = payment_intent {
            if let Some(order) = self.store.find_order_by_payment_intent(payment_intent).await? {
                return Ok(Some(order));
            }
        }
        if let Some(hint) = object
            .pointer("/metadata/order_id")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
        {
            return Ok(self.store.get_order(OrderId::from_uuid(hint)).await?);
        }
        Ok(None)
    }

    /// Best-effort alert write. The alert sink never blocks event handling.
    async fn raise_alert(&self, alert: Alert) {
        let kind = alert.kind.clone();
        if let Err(error) = self.store.insert_alert(alert).await {
            tracing::error!(%error, kind, "alert write failed");
        }
    }
}
