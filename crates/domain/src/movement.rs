//! Inventory movements: the append-only stock ledger.

use chrono::{DateTime, Utc};
use common::{OrderId, VariantId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// The kind of an inventory movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock held for an order before payment; always a negative delta.
    Reservation,

    /// Compensating positive delta that cancels a reservation.
    Release,

    /// Final sale deduction.
    Sale,

    /// Manual or seeding adjustment (either sign).
    Adjustment,
}

impl MovementKind {
    /// Returns the kind name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Reservation => "reservation",
            MovementKind::Release => "release",
            MovementKind::Sale => "sale",
            MovementKind::Adjustment => "adjustment",
        }
    }

    /// Parses a stored kind name.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        match s {
            "reservation" => Ok(MovementKind::Reservation),
            "release" => Ok(MovementKind::Release),
            "sale" => Ok(MovementKind::Sale),
            "adjustment" => Ok(MovementKind::Adjustment),
            other => Err(DomainError::InvalidValue(format!(
                "unknown movement kind {other:?}"
            ))),
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata carried by reservation and release movements so a release can
/// be matched to the reservation it reverses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<Uuid>,
}

impl MovementMetadata {
    /// Metadata for a reservation movement.
    pub fn reservation(order_id: OrderId, reservation_id: Uuid) -> Self {
        Self {
            order_id: Some(order_id),
            reservation_id: Some(reservation_id),
        }
    }
}

/// One immutable row in the stock ledger.
///
/// On-hand stock for a variant is the signed sum of deltas over all of its
/// movements; releasing a reservation never mutates the original row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub variant_id: VariantId,
    pub delta: i64,
    pub kind: MovementKind,
    pub metadata: MovementMetadata,
    pub created_at: DateTime<Utc>,
}
