//! The reservation engine.

use common::{OrderId, VariantId};
use domain::{Alert, AlertKind, AlertSeverity};
use store::{Result, Store};
use uuid::Uuid;

/// An item to reserve for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationItem {
    pub variant_id: VariantId,
    pub quantity: u32,
}

/// Per-variant shortfall detail for a failed reservation.
///
/// `available` is the stock observed at failure time, not before the attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsufficientItem {
    pub variant_id: VariantId,
    pub requested: u32,
    pub available: i64,
}

/// Result of a reservation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationOutcome {
    pub reserved: bool,
    pub insufficient: Vec<InsufficientItem>,
}

/// Performs multi-item, all-or-nothing stock reservation on the ledger.
///
/// Each item is taken through the store's conditional reservation insert,
/// so concurrent callers for the same variant are linearized by whichever
/// insert the store accepts first. If any item fails, every reservation
/// inserted by the same call is reversed with a compensating release
/// movement; a multi-item order never ends up holding partial stock.
pub struct ReservationEngine<S> {
    store: S,
    low_stock_threshold: i64,
}

impl<S: Store> ReservationEngine<S> {
    /// Creates a new reservation engine.
    pub fn new(store: S, low_stock_threshold: i64) -> Self {
        Self {
            store,
            low_stock_threshold,
        }
    }

    /// Reserves stock for every item of an order, or nothing at all.
    #[tracing::instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn reserve_stock_for_order(
        &self,
        order_id: OrderId,
        items: &[ReservationItem],
    ) -> Result<ReservationOutcome> {
        let mut held: Vec<Uuid> = Vec::with_capacity(items.len());
        let mut insufficient: Vec<InsufficientItem> = Vec::new();

        for item in items {
            match self
                .store
                .insert_reservation(item.variant_id, item.quantity, order_id)
                .await?
            {
                Some(reservation_id) => held.push(reservation_id),
                None => {
                    let available = self.store.available_stock(item.variant_id).await?;
                    insufficient.push(InsufficientItem {
                        variant_id: item.variant_id,
                        requested: item.quantity,
                        available,
                    });
                }
            }
        }

        if !insufficient.is_empty() {
            // Reverse everything this call managed to hold.
            for reservation_id in held {
                self.store.release_reservation(reservation_id).await?;
            }
            metrics::counter!("stock_reservations_failed_total").increment(1);
            tracing::info!(
                %order_id,
                insufficient = insufficient.len(),
                "reservation rolled back, insufficient stock"
            );
            return Ok(ReservationOutcome {
                reserved: false,
                insufficient,
            });
        }

        metrics::counter!("stock_reservations_total").increment(1);
        self.raise_low_stock_alerts(items).await;

        Ok(ReservationOutcome {
            reserved: true,
            insufficient: Vec::new(),
        })
    }

    /// Releases every still-active reservation held for an order.
    ///
    /// Idempotent: a second call finds nothing left to reverse and returns 0.
    #[tracing::instrument(skip(self))]
    pub async fn release_stock_for_order(&self, order_id: OrderId) -> Result<usize> {
        let released = self.store.release_reservations_for_order(order_id).await?;
        if released > 0 {
            metrics::counter!("stock_releases_total").increment(released as u64);
            tracing::info!(%order_id, released, "released stock reservations");
        }
        Ok(released)
    }

    /// Raises a daily-deduplicated low-stock alert for any variant that fell
    /// below the threshold. Alerting is best-effort: failures are logged and
    /// never propagated to the reservation caller.
    async fn raise_low_stock_alerts(&self, items: &[ReservationItem]) {
        for item in items {
            let remaining = match self.store.available_stock(item.variant_id).await {
                Ok(remaining) => remaining,
                Err(error) => {
                    tracing::warn!(%error, variant_id = %item.variant_id, "low-stock check failed");
                    continue;
                }
            };
            if remaining >= self.low_stock_threshold {
                continue;
            }
            let alert = Alert::daily(
                AlertKind::LowStock(item.variant_id),
                AlertSeverity::Warning,
                format!(
                    "variant {} has {} unit(s) left (threshold {})",
                    item.variant_id, remaining, self.low_stock_threshold
                ),
            );
            if let Err(error) = self.store.insert_alert(alert).await {
                tracing::warn!(%error, variant_id = %item.variant_id, "low-stock alert write failed");
            }
        }
    }
}
