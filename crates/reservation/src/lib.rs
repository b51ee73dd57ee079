//! Checkout-time stock reservation.
//!
//! Reservations are taken through conditional ledger inserts; multi-item
//! requests are made all-or-nothing with compensating release movements
//! rather than cross-row locking.

pub mod engine;

pub use engine::{InsufficientItem, ReservationEngine, ReservationItem, ReservationOutcome};
