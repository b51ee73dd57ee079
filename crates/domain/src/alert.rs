//! Alert types for the anomaly sink.
//!
//! The sink itself is an external collaborator; the core only writes to it,
//! and write failures are never allowed to block the primary transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an alert is about. The string form doubles as the dedup key for
/// frequency-limited kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// Stock for a variant fell below the configured threshold.
    LowStock(common::VariantId),

    /// A refund would have pushed `refunded_amount` past `total_net`.
    RefundExceedsTotal,

    /// A concurrent refund consumed the remaining headroom first.
    ConcurrentRefundRejected,

    /// A refund arrived for an order that is not in a refundable status.
    RefundOnUnrefundableOrder,

    /// A dispute/chargeback was opened; recorded for audit only.
    Chargeback,
}

impl AlertKind {
    /// Returns the kind key as stored in the database.
    pub fn key(&self) -> String {
        match self {
            AlertKind::LowStock(variant_id) => format!("low_stock:{variant_id}"),
            AlertKind::RefundExceedsTotal => "refund_exceeds_total".to_string(),
            AlertKind::ConcurrentRefundRejected => "concurrent_refund_rejected".to_string(),
            AlertKind::RefundOnUnrefundableOrder => "refund_on_unrefundable_order".to_string(),
            AlertKind::Chargeback => "chargeback".to_string(),
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// One inbox item for a human reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: String,
    pub severity: AlertSeverity,
    pub message: String,

    /// Set for frequency-limited alerts: at most one row per `(kind, date)`.
    pub dedup_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// An unconditional alert.
    pub fn new(kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.key(),
            severity,
            message: message.into(),
            dedup_date: None,
            created_at: Utc::now(),
        }
    }

    /// A daily-deduplicated alert keyed by `(kind, date)`.
    pub fn daily(kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: kind.key(),
            severity,
            message: message.into(),
            dedup_date: Some(now.date_naive()),
            created_at: now,
        }
    }
}
