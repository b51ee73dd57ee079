use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, VariantId};
use domain::{
    Alert, InventoryMovement, MovementKind, MovementMetadata, Order, OrderStatus,
    OrderStatusHistory, Payment, ProcessedEvent, Refund,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::Result;
use crate::store::{PaidOutcome, Store};

/// PostgreSQL-backed store implementation.
///
/// Guarded operations are conditional statements; the caller learns whether
/// it won the race from the affected-row count. Reservation inserts
/// additionally take a per-variant advisory lock inside their transaction
/// so that concurrent conditional inserts for the same variant serialize
/// instead of both reading the same ledger sum, and release inserts lean on
/// a partial unique index so a reservation is compensated at most once.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the given database URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status_str: String = row.try_get("status")?;
        let status = OrderStatus::parse(&status_str)?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            status,
            total_net: Money::from_minor(row.try_get("total_net")?),
            refunded_amount: Money::from_minor(row.try_get("refunded_amount")?),
            refund_count: row.try_get::<i32, _>("refund_count")? as u32,
            currency: row.try_get("currency")?,
            provider_checkout_session_id: row.try_get("provider_checkout_session_id")?,
            provider_payment_intent_id: row.try_get("provider_payment_intent_id")?,
            paid_at: row.try_get("paid_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_movement(row: PgRow) -> Result<InventoryMovement> {
        let kind_str: String = row.try_get("kind")?;
        let kind = MovementKind::parse(&kind_str)?;
        let metadata: MovementMetadata =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("metadata")?)?;

        Ok(InventoryMovement {
            id: row.try_get("id")?,
            variant_id: VariantId::from_uuid(row.try_get::<Uuid, _>("variant_id")?),
            delta: row.try_get("delta")?,
            kind,
            metadata,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        Ok(Payment {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            amount: Money::from_minor(row.try_get("amount")?),
            currency: row.try_get("currency")?,
            provider_payment_id: row.try_get("provider_payment_id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_history(row: PgRow) -> Result<OrderStatusHistory> {
        let old_str: String = row.try_get("old_status")?;
        let new_str: String = row.try_get("new_status")?;
        let old_status = OrderStatus::parse(&old_str)?;
        let new_status = OrderStatus::parse(&new_str)?;

        Ok(OrderStatusHistory {
            id: row.try_get("id")?,
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            old_status,
            new_status,
            reason: row.try_get("reason")?,
            provider_event_id: row.try_get("provider_event_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_order(&self, order: Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, status, total_net, refunded_amount, refund_count, currency,
                                provider_checkout_session_id, provider_payment_intent_id,
                                paid_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.total_net.minor())
        .bind(order.refunded_amount.minor())
        .bind(order.refund_count as i32)
        .bind(&order.currency)
        .bind(&order.provider_checkout_session_id)
        .bind(&order.provider_payment_intent_id)
        .bind(order.paid_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE provider_checkout_session_id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE provider_payment_intent_id = $1")
            .bind(payment_intent_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_order).transpose()
    }

    async fn mark_order_paid(
        &self,
        id: OrderId,
        payment_intent_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<PaidOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'paid',
                paid_at = COALESCE(paid_at, $3),
                provider_payment_intent_id = COALESCE(provider_payment_intent_id, $2),
                updated_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id.as_uuid())
        .bind(payment_intent_id)
        .bind(paid_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 1 {
            return Ok(PaidOutcome::Transitioned);
        }

        // The row lock on the statement above serializes concurrent
        // confirmations; the loser re-evaluates the predicate, lands here,
        // and refreshes identifiers without claiming the transition.
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET paid_at = COALESCE(paid_at, $3),
                provider_payment_intent_id = COALESCE(provider_payment_intent_id, $2),
                updated_at = now()
            WHERE id = $1 AND status = 'paid'
            "#,
        )
        .bind(id.as_uuid())
        .bind(payment_intent_id)
        .bind(paid_at)
        .execute(&self.pool)
        .await?;
        Ok(if result.rows_affected() == 1 {
            PaidOutcome::AlreadyPaid
        } else {
            PaidOutcome::NotPayable
        })
    }

    async fn apply_refund(&self, id: OrderId, amount: Money) -> Result<bool> {
        // The guard condition is re-evaluated inside the statement, so a
        // concurrent refund that consumed the headroom first makes this a
        // zero-row update rather than an overshoot.
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET refunded_amount = refunded_amount + $2,
                refund_count = refund_count + 1,
                status = CASE
                    WHEN refunded_amount + $2 >= total_net THEN 'refunded'
                    ELSE 'partially_refunded'
                END,
                updated_at = now()
            WHERE id = $1
              AND status IN ('paid', 'partially_refunded')
              AND refunded_amount + $2 <= total_net
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount.minor())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn cancel_order(&self, id: OrderId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'cancelled', updated_at = now()
            WHERE id = $1 AND status IN ('pending', 'paid')
            "#,
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_status_history(&self, row: OrderStatusHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_history
                (id, order_id, old_status, new_status, reason, provider_event_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.id)
        .bind(row.order_id.as_uuid())
        .bind(row.old_status.as_str())
        .bind(row.new_status.as_str())
        .bind(&row.reason)
        .bind(&row.provider_event_id)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn status_history_for_order(&self, id: OrderId) -> Result<Vec<OrderStatusHistory>> {
        let rows = sqlx::query(
            "SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_history).collect()
    }

    async fn available_stock(&self, variant_id: VariantId) -> Result<i64> {
        let sum: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(delta)::bigint FROM inventory_movements WHERE variant_id = $1",
        )
        .bind(variant_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    async fn insert_reservation(
        &self,
        variant_id: VariantId,
        quantity: u32,
        order_id: OrderId,
    ) -> Result<Option<Uuid>> {
        let reservation_id = Uuid::new_v4();
        let metadata =
            serde_json::to_value(MovementMetadata::reservation(order_id, reservation_id))?;
        let qty = i64::from(quantity);

        let mut tx = self.pool.begin().await?;

        // Concurrent reservations for the same variant serialize here, so
        // the SUM below always sees the latest committed ledger state.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(variant_id.as_uuid().to_string())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, variant_id, delta, kind, metadata, created_at)
            SELECT $1, $2, $3, 'reservation', $4, now()
            WHERE COALESCE(
                (SELECT SUM(delta) FROM inventory_movements WHERE variant_id = $2), 0
            ) >= $5
            "#,
        )
        .bind(reservation_id)
        .bind(variant_id.as_uuid())
        .bind(-qty)
        .bind(&metadata)
        .bind(qty)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(if result.rows_affected() == 1 {
            Some(reservation_id)
        } else {
            None
        })
    }

    async fn release_reservation(&self, reservation_id: Uuid) -> Result<bool> {
        // The NOT EXISTS filter is not race-proof under READ COMMITTED: two
        // concurrent releases can both snapshot before either commits. The
        // partial unique index on (metadata->>'reservation_id') for release
        // rows makes the loser's insert a conflict instead of a second
        // compensation.
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, variant_id, delta, kind, metadata, created_at)
            SELECT gen_random_uuid(), r.variant_id, -r.delta, 'release', r.metadata, now()
            FROM inventory_movements r
            WHERE r.id = $1
              AND r.kind = 'reservation'
              AND NOT EXISTS (
                  SELECT 1 FROM inventory_movements rel
                  WHERE rel.kind = 'release'
                    AND (rel.metadata->>'reservation_id')::uuid = r.id
              )
            ON CONFLICT ((metadata->>'reservation_id')) WHERE kind = 'release' DO NOTHING
            "#,
        )
        .bind(reservation_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_reservations_for_order(&self, order_id: OrderId) -> Result<usize> {
        let result = sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, variant_id, delta, kind, metadata, created_at)
            SELECT gen_random_uuid(), r.variant_id, -r.delta, 'release', r.metadata, now()
            FROM inventory_movements r
            WHERE r.kind = 'reservation'
              AND r.metadata->>'order_id' = $1
              AND NOT EXISTS (
                  SELECT 1 FROM inventory_movements rel
                  WHERE rel.kind = 'release'
                    AND (rel.metadata->>'reservation_id')::uuid = r.id
              )
            ON CONFLICT ((metadata->>'reservation_id')) WHERE kind = 'release' DO NOTHING
            "#,
        )
        .bind(order_id.as_uuid().to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as usize)
    }

    async fn insert_adjustment(
        &self,
        variant_id: VariantId,
        delta: i64,
        kind: MovementKind,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_movements (id, variant_id, delta, kind, metadata, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, '{}', now())
            "#,
        )
        .bind(variant_id.as_uuid())
        .bind(delta)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn movements_for_variant(&self, variant_id: VariantId) -> Result<Vec<InventoryMovement>> {
        let rows = sqlx::query(
            "SELECT * FROM inventory_movements WHERE variant_id = $1 ORDER BY created_at ASC",
        )
        .bind(variant_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_movement).collect()
    }

    async fn insert_payment(&self, payment: Payment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount, currency, provider_payment_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider_payment_id) DO NOTHING
            "#,
        )
        .bind(payment.id)
        .bind(payment.order_id.as_uuid())
        .bind(payment.amount.minor())
        .bind(&payment.currency)
        .bind(&payment.provider_payment_id)
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query("SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at ASC")
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn insert_refund(&self, refund: Refund) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO refunds (id, order_id, provider_refund_id, amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (provider_refund_id) DO NOTHING
            "#,
        )
        .bind(refund.id)
        .bind(refund.order_id.map(|id| id.as_uuid()))
        .bind(&refund.provider_refund_id)
        .bind(refund.amount.minor())
        .bind(&refund.status)
        .bind(refund.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_processed_event(&self, event: ProcessedEvent) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_events (provider_event_id, event_type, payload, processed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (provider_event_id) DO NOTHING
            "#,
        )
        .bind(&event.provider_event_id)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.processed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn ensure_fulfillment(&self, order_id: OrderId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO fulfillments (order_id, created_at)
            VALUES ($1, now())
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_alert(&self, alert: Alert) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (id, kind, severity, message, dedup_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (kind, dedup_date) WHERE dedup_date IS NOT NULL DO NOTHING
            "#,
        )
        .bind(alert.id)
        .bind(&alert.kind)
        .bind(alert.severity.as_str())
        .bind(&alert.message)
        .bind(alert.dedup_date)
        .bind(alert.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
