//! Webhook processing errors.

use common::{Money, OrderId};

use crate::signature::SignatureError;

/// Errors surfaced while handling an inbound webhook delivery.
///
/// `RefundExceedsTotal` and `ConcurrentRefundRejected` are invariant
/// violations: the delivery fails so the provider retries it against a
/// consistent view, and a critical alert has already been written.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("signature verification failed: {0}")]
    InvalidSignature(#[from] SignatureError),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("webhook signing secret is not configured")]
    MissingSecret,

    #[error("refund of {amount} on order {order_id} would exceed the order total {total_net}")]
    RefundExceedsTotal {
        order_id: OrderId,
        amount: Money,
        total_net: Money,
    },

    #[error("concurrent refund consumed the remaining headroom on order {0}")]
    ConcurrentRefundRejected(OrderId),

    #[error(transparent)]
    Store(#[from] store::StoreError),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
