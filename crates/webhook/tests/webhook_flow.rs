//! End-to-end webhook processing tests against the in-memory store.

use chrono::Utc;
use common::{Money, OrderId};
use domain::{Order, OrderStatus};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use store::{InMemoryStore, Store};
use webhook::{
    InMemoryNotificationService, Outcome, SignatureVerifier, WebhookError, WebhookProcessor,
};

const SECRET: &str = "whsec_test123secret456";

type HmacSha256 = Hmac<Sha256>;

fn sign(payload: &[u8]) -> String {
    let timestamp = Utc::now().timestamp();
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac =
        HmacSha256::new_from_slice(SECRET.as_bytes()).expect("HMAC can take key of any size");
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn processor(
    store: InMemoryStore,
) -> (
    WebhookProcessor<InMemoryStore, InMemoryNotificationService>,
    InMemoryNotificationService,
) {
    let notifier = InMemoryNotificationService::new();
    let processor = WebhookProcessor::new(
        store,
        Some(SignatureVerifier::new(SECRET, 300)),
        notifier.clone(),
    );
    (processor, notifier)
}

async fn seed_order(store: &InMemoryStore, total_minor: i64, session_id: &str) -> OrderId {
    let order =
        Order::new(OrderId::new(), Money::from_minor(total_minor), "eur").with_checkout_session(session_id);
    let id = order.id;
    store.insert_order(order).await.unwrap();
    id
}

async fn seed_paid_order(store: &InMemoryStore, total_minor: i64, payment_intent: &str) -> OrderId {
    let id = seed_order(store, total_minor, "cs_seed").await;
    store
        .mark_order_paid(id, Some(payment_intent), Utc::now())
        .await
        .unwrap();
    id
}

fn checkout_event(event_id: &str, session_id: &str, payment_intent: &str, amount: i64) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "payment_intent": payment_intent,
            "amount_total": amount,
            "currency": "eur",
        }}
    })
    .to_string()
    .into_bytes()
}

fn refund_event(event_id: &str, payment_intent: &str, refunds: &[(&str, i64)]) -> Vec<u8> {
    let entries: Vec<_> = refunds
        .iter()
        .map(|(id, amount)| json!({ "id": id, "amount": amount, "status": "succeeded" }))
        .collect();
    json!({
        "id": event_id,
        "type": "charge.refunded",
        "data": { "object": {
            "id": "ch_1",
            "payment_intent": payment_intent,
            "refunds": { "data": entries },
        }}
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn checkout_completion_pays_the_order() {
    let store = InMemoryStore::new();
    let order_id = seed_order(&store, 10_000, "cs_1").await;
    let (processor, notifier) = processor(store.clone());

    let payload = checkout_event("evt_1", "cs_1", "pi_1", 10_000);
    let outcome = processor.process(&payload, Some(&sign(&payload))).await.unwrap();

    assert_eq!(outcome, Outcome::Processed);
    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.paid_at.is_some());
    assert_eq!(order.provider_payment_intent_id.as_deref(), Some("pi_1"));

    let payments = store.payments().await;
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].provider_payment_id, "pi_1");
    assert_eq!(payments[0].amount, Money::from_minor(10_000));

    assert!(store.has_fulfillment(order_id).await);
    assert_eq!(notifier.sent(), vec![order_id]);

    let history = store.status_history_for_order(order_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, OrderStatus::Pending);
    assert_eq!(history[0].new_status, OrderStatus::Paid);
    assert_eq!(history[0].provider_event_id.as_deref(), Some("evt_1"));
}

#[tokio::test]
async fn redelivered_event_runs_side_effects_exactly_once() {
    let store = InMemoryStore::new();
    let order_id = seed_order(&store, 10_000, "cs_1").await;
    let (processor, notifier) = processor(store.clone());

    let payload = checkout_event("evt_1", "cs_1", "pi_1", 10_000);
    let header = sign(&payload);

    assert_eq!(
        processor.process(&payload, Some(&header)).await.unwrap(),
        Outcome::Processed
    );
    let paid_at = store.get_order(order_id).await.unwrap().unwrap().paid_at;

    for _ in 0..2 {
        assert_eq!(
            processor.process(&payload, Some(&header)).await.unwrap(),
            Outcome::Duplicate
        );
    }

    assert_eq!(store.payments().await.len(), 1);
    assert_eq!(notifier.sent_count(), 1);
    assert_eq!(store.processed_event_count().await, 1);
    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.paid_at, paid_at);
}

#[tokio::test]
async fn same_payment_in_a_fresh_event_is_not_doubled() {
    let store = InMemoryStore::new();
    let order_id = seed_order(&store, 10_000, "cs_1").await;
    let (processor, notifier) = processor(store.clone());

    let first = checkout_event("evt_1", "cs_1", "pi_1", 10_000);
    let second = checkout_event("evt_2", "cs_1", "pi_1", 10_000);

    assert_eq!(
        processor.process(&first, Some(&sign(&first))).await.unwrap(),
        Outcome::Processed
    );
    // Distinct event id, same payment intent: accepted but inert.
    assert_eq!(
        processor.process(&second, Some(&sign(&second))).await.unwrap(),
        Outcome::Processed
    );

    assert_eq!(store.payments().await.len(), 1);
    assert_eq!(notifier.sent_count(), 1);
    assert!(store.has_fulfillment(order_id).await);
}

#[tokio::test]
async fn partial_then_full_refund_walks_the_status_machine() {
    let store = InMemoryStore::new();
    let order_id = seed_paid_order(&store, 10_000, "pi_1").await;
    let (processor, _) = processor(store.clone());

    let partial = refund_event("evt_r1", "pi_1", &[("re_1", 6_000)]);
    processor.process(&partial, Some(&sign(&partial))).await.unwrap();

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::PartiallyRefunded);
    assert_eq!(order.refunded_amount, Money::from_minor(6_000));
    assert_eq!(order.refund_count, 1);

    let full = refund_event("evt_r2", "pi_1", &[("re_2", 4_000)]);
    processor.process(&full, Some(&sign(&full))).await.unwrap();

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Refunded);
    assert_eq!(order.refunded_amount, Money::from_minor(10_000));
    assert_eq!(order.refund_count, 2);

    let history = store.status_history_for_order(order_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].new_status, OrderStatus::PartiallyRefunded);
    assert_eq!(history[1].new_status, OrderStatus::Refunded);
}

#[tokio::test]
async fn refund_past_the_total_is_rejected_with_an_alert() {
    let store = InMemoryStore::new();
    let order_id = seed_paid_order(&store, 10_000, "pi_1").await;
    let (processor, _) = processor(store.clone());

    let first = refund_event("evt_r1", "pi_1", &[("re_1", 6_000)]);
    processor.process(&first, Some(&sign(&first))).await.unwrap();

    // 6000 + 6000 would overshoot a 10000 total.
    let second = refund_event("evt_r2", "pi_1", &[("re_2", 6_000)]);
    let err = processor.process(&second, Some(&sign(&second))).await.unwrap_err();
    assert!(matches!(err, WebhookError::RefundExceedsTotal { .. }));

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.refunded_amount, Money::from_minor(6_000));
    assert_eq!(order.status, OrderStatus::PartiallyRefunded);

    let alerts = store.alerts().await;
    assert!(alerts.iter().any(|a| a.kind == "refund_exceeds_total"));
}

#[tokio::test]
async fn failing_refund_does_not_starve_its_siblings() {
    let store = InMemoryStore::new();
    let order_id = seed_paid_order(&store, 10_000, "pi_1").await;
    let (processor, _) = processor(store.clone());

    // One event bundling an overshooting refund ahead of a valid one. The
    // event id is durable after the first delivery, so the valid sibling
    // gets exactly this one chance to be applied.
    let payload = refund_event("evt_r1", "pi_1", &[("re_bad", 20_000), ("re_ok", 1_000)]);
    let header = sign(&payload);
    let err = processor.process(&payload, Some(&header)).await.unwrap_err();
    assert!(matches!(err, WebhookError::RefundExceedsTotal { .. }));

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.refunded_amount, Money::from_minor(1_000));
    assert_eq!(order.status, OrderStatus::PartiallyRefunded);
    assert_eq!(store.refunds().await.len(), 2);
    let alerts = store.alerts().await;
    assert!(alerts.iter().any(|a| a.kind == "refund_exceeds_total"));

    // Redelivery short-circuits; nothing was left behind to pick up.
    assert_eq!(
        processor.process(&payload, Some(&header)).await.unwrap(),
        Outcome::Duplicate
    );
    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.refunded_amount, Money::from_minor(1_000));
}

#[tokio::test]
async fn concurrent_refunds_never_overshoot_the_total() {
    let store = InMemoryStore::new();
    let order_id = seed_paid_order(&store, 10_000, "pi_1").await;
    let (processor, _) = processor(store.clone());
    let processor = Arc::new(processor);

    let a = refund_event("evt_ra", "pi_1", &[("re_a", 6_000)]);
    let b = refund_event("evt_rb", "pi_1", &[("re_b", 6_000)]);
    let sig_a = sign(&a);
    let sig_b = sign(&b);

    let pa = processor.clone();
    let pb = processor.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { pa.process(&a, Some(&sig_a)).await }),
        tokio::spawn(async move { pb.process(&b, Some(&sig_b)).await }),
    );
    let results = [ra.unwrap(), rb.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(matches!(
                err,
                WebhookError::RefundExceedsTotal { .. }
                    | WebhookError::ConcurrentRefundRejected(_)
            ));
        }
    }

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.refunded_amount, Money::from_minor(6_000));
    assert!(order.refunded_amount <= order.total_net);
}

#[tokio::test]
async fn concurrent_first_confirmations_append_one_history_row() {
    let store = InMemoryStore::new();
    let order_id = seed_order(&store, 10_000, "cs_1").await;
    let (processor, _) = processor(store.clone());
    let processor = Arc::new(processor);

    // Two distinct event ids for the same session; the idempotency marker
    // does not dedupe them, the mark-paid outcome must.
    let a = checkout_event("evt_a", "cs_1", "pi_1", 10_000);
    let b = checkout_event("evt_b", "cs_1", "pi_1", 10_000);
    let sig_a = sign(&a);
    let sig_b = sign(&b);

    let pa = processor.clone();
    let pb = processor.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { pa.process(&a, Some(&sig_a)).await }),
        tokio::spawn(async move { pb.process(&b, Some(&sig_b)).await }),
    );
    ra.unwrap().unwrap();
    rb.unwrap().unwrap();

    let history = store.status_history_for_order(order_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].old_status, OrderStatus::Pending);
    assert_eq!(history[0].new_status, OrderStatus::Paid);
    assert_eq!(store.payments().await.len(), 1);
}

#[tokio::test]
async fn refund_on_cancelled_order_is_a_recorded_no_op() {
    let store = InMemoryStore::new();
    let order_id = seed_paid_order(&store, 10_000, "pi_1").await;
    store.cancel_order(order_id).await.unwrap();
    let (processor, _) = processor(store.clone());

    let payload = refund_event("evt_r1", "pi_1", &[("re_1", 1_000)]);
    let outcome = processor.process(&payload, Some(&sign(&payload))).await.unwrap();
    assert_eq!(outcome, Outcome::Processed);

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.refunded_amount, Money::zero());

    // The refund row itself is kept for audit.
    assert_eq!(store.refunds().await.len(), 1);
    let alerts = store.alerts().await;
    assert!(alerts.iter().any(|a| a.kind == "refund_on_unrefundable_order"));
}

#[tokio::test]
async fn refund_for_unknown_order_is_recorded_unattached() {
    let store = InMemoryStore::new();
    let (processor, _) = processor(store.clone());

    let payload = refund_event("evt_r1", "pi_nobody", &[("re_1", 1_000)]);
    let outcome = processor.process(&payload, Some(&sign(&payload))).await.unwrap();
    assert_eq!(outcome, Outcome::Processed);

    let refunds = store.refunds().await;
    assert_eq!(refunds.len(), 1);
    assert!(refunds[0].order_id.is_none());
}

#[tokio::test]
async fn dispute_alerts_without_touching_the_order() {
    let store = InMemoryStore::new();
    let order_id = seed_paid_order(&store, 10_000, "pi_1").await;
    let (processor, _) = processor(store.clone());

    let payload = json!({
        "id": "evt_d1",
        "type": "charge.dispute.created",
        "data": { "object": {
            "id": "dp_1",
            "payment_intent": "pi_1",
            "reason": "fraudulent",
        }}
    })
    .to_string()
    .into_bytes();
    let outcome = processor.process(&payload, Some(&sign(&payload))).await.unwrap();
    assert_eq!(outcome, Outcome::Processed);

    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(store.status_history_for_order(order_id).await.unwrap().is_empty());

    let alerts = store.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, "chargeback");
}

#[tokio::test]
async fn unknown_event_type_is_recorded_and_ignored() {
    let store = InMemoryStore::new();
    let (processor, _) = processor(store.clone());

    let payload = json!({ "id": "evt_x", "type": "invoice.created", "data": { "object": {} } })
        .to_string()
        .into_bytes();
    let header = sign(&payload);

    assert_eq!(
        processor.process(&payload, Some(&header)).await.unwrap(),
        Outcome::Ignored
    );
    // Recorded: a redelivery short-circuits as a duplicate.
    assert_eq!(
        processor.process(&payload, Some(&header)).await.unwrap(),
        Outcome::Duplicate
    );
}

#[tokio::test]
async fn payment_for_unknown_order_is_ignored() {
    let store = InMemoryStore::new();
    let (processor, notifier) = processor(store.clone());

    let payload = checkout_event("evt_1", "cs_nobody", "pi_nobody", 10_000);
    let outcome = processor.process(&payload, Some(&sign(&payload))).await.unwrap();

    assert_eq!(outcome, Outcome::Ignored);
    assert!(store.payments().await.is_empty());
    assert_eq!(notifier.sent_count(), 0);
}

#[tokio::test]
async fn bad_signature_leaves_no_trace() {
    let store = InMemoryStore::new();
    seed_order(&store, 10_000, "cs_1").await;
    let (processor, _) = processor(store.clone());

    let payload = checkout_event("evt_1", "cs_1", "pi_1", 10_000);
    let err = processor
        .process(&payload, Some("t=1,v1=deadbeef"))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature(_)));

    assert_eq!(store.processed_event_count().await, 0);
    assert!(store.payments().await.is_empty());
}

#[tokio::test]
async fn missing_header_is_rejected() {
    let store = InMemoryStore::new();
    let (processor, _) = processor(store.clone());

    let payload = checkout_event("evt_1", "cs_1", "pi_1", 10_000);
    let err = processor.process(&payload, None).await.unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature(_)));
}

#[tokio::test]
async fn missing_secret_fails_loudly() {
    let store = InMemoryStore::new();
    let notifier = InMemoryNotificationService::new();
    let processor = WebhookProcessor::new(store.clone(), None, notifier);

    let payload = checkout_event("evt_1", "cs_1", "pi_1", 10_000);
    let err = processor.process(&payload, Some(&sign(&payload))).await.unwrap_err();
    assert!(matches!(err, WebhookError::MissingSecret));
    assert_eq!(store.processed_event_count().await, 0);
}

#[tokio::test]
async fn notification_failure_does_not_fail_the_delivery() {
    let store = InMemoryStore::new();
    let order_id = seed_order(&store, 10_000, "cs_1").await;
    let (processor, notifier) = processor(store.clone());
    notifier.set_fail_on_send(true);

    let payload = checkout_event("evt_1", "cs_1", "pi_1", 10_000);
    let outcome = processor.process(&payload, Some(&sign(&payload))).await.unwrap();

    assert_eq!(outcome, Outcome::Processed);
    assert_eq!(store.payments().await.len(), 1);
    assert!(store.has_fulfillment(order_id).await);
    assert_eq!(notifier.sent_count(), 0);
}

#[tokio::test]
async fn zero_amount_refund_is_skipped() {
    let store = InMemoryStore::new();
    let order_id = seed_paid_order(&store, 10_000, "pi_1").await;
    let (processor, _) = processor(store.clone());

    let payload = refund_event("evt_r1", "pi_1", &[("re_1", 0)]);
    processor.process(&payload, Some(&sign(&payload))).await.unwrap();

    assert!(store.refunds().await.is_empty());
    let order = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.refunded_amount, Money::zero());
}
