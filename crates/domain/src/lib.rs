//! Domain layer for the payment-and-inventory consistency engine.
//!
//! This crate provides the pure (storage-free) parts of the core:
//! - The order status state machine and `derive_status`
//! - Record types shared by the storage and processing layers
//! - Alert types for the anomaly sink

pub mod alert;
pub mod error;
pub mod movement;
pub mod order;
pub mod payment;
pub mod records;
pub mod status;

pub use alert::{Alert, AlertKind, AlertSeverity};
pub use error::DomainError;
pub use movement::{InventoryMovement, MovementKind, MovementMetadata};
pub use order::Order;
pub use payment::{Payment, Refund};
pub use records::{OrderStatusHistory, ProcessedEvent};
pub use status::{OrderStatus, derive_status};
