//! Shared types used across the backoffice core.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{OrderId, VariantId};
