//! # Order Repository (Order Recorder)
//!
//! Write-once persistence for completed sales.
//!
//! ## Snapshot Pattern
//! Line items carry the unit price the cashier saw, copied at sale time.
//! Repricing a product later never changes historical totals.
//!
//! All validation (stock sufficiency, positive quantities) is the engine's
//! responsibility; this repository persists what it is given, inside the
//! engine's transaction.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use atlas_core::{Order, OrderItem, OrderWithItems, DEFAULT_PAGE_SIZE};

/// Hard ceiling on order page size.
const MAX_PAGE_SIZE: u32 = 200;

/// Repository for sales orders and their line items.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Inserts an order header and its line items in the caller's
    /// transaction. Rolls back with the transaction if any later step
    /// of the sale fails.
    pub async fn insert_order(
        &self,
        conn: &mut SqliteConnection,
        order: &Order,
        items: &[OrderItem],
    ) -> DbResult<()> {
        debug!(order_id = %order.id, branch_id = %order.branch_id, total_cents = order.total_cents, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (id, branch_id, user_id, total_cents, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&order.id)
        .bind(&order.branch_id)
        .bind(&order.user_id)
        .bind(order.total_cents)
        .bind(order.status)
        .bind(order.created_at)
        .execute(&mut *conn)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&item.id)
            .bind(&item.order_id)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.created_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Gets one order with its items.
    pub async fn get_with_items(&self, order_id: &str) -> DbResult<Option<OrderWithItems>> {
        let order = sqlx::query_as::<_, Order>(
            "SELECT id, branch_id, user_id, total_cents, status, created_at \
             FROM orders WHERE id = ?1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(order) = order else {
            return Ok(None);
        };

        let items = self.items_for(order_id).await?;

        Ok(Some(OrderWithItems { order, items }))
    }

    /// Lists orders with nested items, most recent first, optionally for
    /// one branch. Read-only, no side effects. A `limit` of 0 selects
    /// the default page size; anything above the hard ceiling is capped.
    pub async fn list(
        &self,
        branch_id: Option<&str>,
        limit: u32,
    ) -> DbResult<Vec<OrderWithItems>> {
        let limit = if limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            limit.min(MAX_PAGE_SIZE)
        } as i64;

        let orders = match branch_id {
            Some(branch_id) => {
                sqlx::query_as::<_, Order>(
                    "SELECT id, branch_id, user_id, total_cents, status, created_at \
                     FROM orders WHERE branch_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                )
                .bind(branch_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Order>(
                    "SELECT id, branch_id, user_id, total_cents, status, created_at \
                     FROM orders ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.items_for(&order.id).await?;
            result.push(OrderWithItems { order, items });
        }

        Ok(result)
    }

    /// True if any order line references the product. Referential guard
    /// for product deletion, evaluated in the caller's transaction.
    pub async fn has_history_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM order_items WHERE product_id = ?1")
                .bind(product_id)
                .fetch_one(&mut *conn)
                .await?;

        Ok(count > 0)
    }

    /// True if any order was placed at the branch. Referential guard for
    /// branch deletion, evaluated in the caller's transaction.
    pub async fn has_history_for_branch(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
    ) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE branch_id = ?1")
            .bind(branch_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count > 0)
    }

    async fn items_for(&self, order_id: &str) -> DbResult<Vec<OrderItem>> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, quantity, unit_price_cents, created_at \
             FROM order_items WHERE order_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }
}
