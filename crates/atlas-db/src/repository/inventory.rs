//! # Inventory Repository (Ledger Store)
//!
//! Durable keyed storage for per-(product, branch) quantities. Pure data
//! layer: no business rules, no transaction boundary of its own. All
//! writes happen on the engine's transaction connection.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use atlas_core::Inventory;

/// Repository for the mutable ledger state.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Current quantity for (product, branch), 0 if no record exists.
    ///
    /// Pool read for display and tests; inside an engine transaction use
    /// [`get_quantity`](Self::get_quantity) instead so the read is part
    /// of the serialized unit of work.
    pub async fn quantity(&self, product_id: &str, branch_id: &str) -> DbResult<i64> {
        let quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM inventory WHERE product_id = ?1 AND branch_id = ?2",
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quantity.unwrap_or(0))
    }

    /// Full inventory record, if one exists.
    pub async fn get(&self, product_id: &str, branch_id: &str) -> DbResult<Option<Inventory>> {
        let inventory = sqlx::query_as::<_, Inventory>(
            r#"
            SELECT product_id, branch_id, quantity, updated_at
            FROM inventory
            WHERE product_id = ?1 AND branch_id = ?2
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(inventory)
    }

    /// Quantity read inside the caller's transaction, 0 if absent.
    pub async fn get_quantity(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
    ) -> DbResult<i64> {
        let quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM inventory WHERE product_id = ?1 AND branch_id = ?2",
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(quantity.unwrap_or(0))
    }

    /// Upserts the quantity record inside the caller's transaction.
    ///
    /// ## Contract
    /// `new_quantity` must be non-negative; the engine validates stock
    /// sufficiency before calling. A negative value here is a programming
    /// error (and would be rejected by the schema CHECK as well).
    pub async fn set_quantity(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        new_quantity: i64,
    ) -> DbResult<()> {
        debug_assert!(new_quantity >= 0, "ledger quantity must stay non-negative");

        debug!(product_id, branch_id, new_quantity, "Setting ledger quantity");

        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO inventory (product_id, branch_id, quantity, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (product_id, branch_id)
            DO UPDATE SET quantity = excluded.quantity, updated_at = excluded.updated_at
            "#,
        )
        .bind(product_id)
        .bind(branch_id)
        .bind(new_quantity)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Removes all quantity records for a product (entity-deletion cascade).
    pub async fn delete_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM inventory WHERE product_id = ?1")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Removes all quantity records for a branch (entity-deletion cascade).
    pub async fn delete_for_branch(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM inventory WHERE branch_id = ?1")
            .bind(branch_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
