//! Inbound payment provider webhook handling.
//!
//! Signature verification, the durable event idempotency guard, and the
//! payment/refund/dispute handlers live here. The processor is generic over
//! the storage backend and the notification service so tests run fully
//! in memory.

pub mod error;
pub mod event;
pub mod processor;
pub mod services;
pub mod signature;

pub use error::{Result, WebhookError};
pub use event::ProviderEvent;
pub use processor::{Outcome, WebhookProcessor};
pub use services::{
    InMemoryNotificationService, NotificationError, NotificationService,
    TracingNotificationService,
};
pub use signature::{SignatureError, SignatureVerifier};
