//! Storage layer for the payment-and-inventory consistency engine.
//!
//! All mutual exclusion in the system lives here: every shared-state
//! mutation is a conditional single-statement write whose affected-row
//! count tells the caller whether it won the race. There are no in-process
//! locks above this crate and no read-modify-write across two round trips.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{PaidOutcome, Store};
