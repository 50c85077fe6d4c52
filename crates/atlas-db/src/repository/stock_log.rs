//! # Stock Log Repository (Audit Recorder)
//!
//! Append-only audit trail for every quantity-changing event.
//!
//! ## Ordering Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Inside one engine transaction:                                     │
//! │                                                                     │
//! │    1. record()  ── reads CURRENT quantity → prev_quantity           │
//! │    │             appends entry with new = prev + delta              │
//! │    ▼                                                                │
//! │    2. engine    ── writes new quantity to the ledger store          │
//! │                                                                     │
//! │  The recorder's read happens-before the engine's write, both        │
//! │  inside the same IMMEDIATE transaction, so no concurrent operation  │
//! │  can interleave between them. Replaying quantity_change from 0      │
//! │  therefore reproduces every prev/new pair exactly.                  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The recorder never mutates inventory itself; sequencing the quantity
//! write is the engine's responsibility.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use atlas_core::{Movement, StockLogEntry, DEFAULT_PAGE_SIZE};

/// Hard ceiling on log page size, whatever the caller asks for.
const MAX_PAGE_SIZE: u32 = 500;

const ENTRY_COLUMNS: &str = "id, product_id, branch_id, user_id, quantity_change, \
     movement_type, prev_quantity, new_quantity, note, created_at";

/// Repository for the append-only stock movement log.
#[derive(Debug, Clone)]
pub struct StockLogRepository {
    pool: SqlitePool,
}

impl StockLogRepository {
    /// Creates a new StockLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockLogRepository { pool }
    }

    /// Appends one audit entry inside the caller's transaction.
    ///
    /// Reads the current quantity for the movement's (product, branch)
    /// key to capture `prev_quantity`, then inserts the entry with
    /// `new_quantity = prev_quantity + quantity_change`. Any storage
    /// failure propagates and aborts the enclosing transaction.
    pub async fn record(
        &self,
        conn: &mut SqliteConnection,
        movement: &Movement<'_>,
    ) -> DbResult<StockLogEntry> {
        let prev_quantity: Option<i64> = sqlx::query_scalar(
            "SELECT quantity FROM inventory WHERE product_id = ?1 AND branch_id = ?2",
        )
        .bind(movement.product_id)
        .bind(movement.branch_id)
        .fetch_optional(&mut *conn)
        .await?;

        let prev_quantity = prev_quantity.unwrap_or(0);
        let new_quantity = prev_quantity + movement.quantity_change;

        let entry = StockLogEntry {
            id: Uuid::new_v4().to_string(),
            product_id: movement.product_id.to_string(),
            branch_id: movement.branch_id.to_string(),
            user_id: movement.user_id.to_string(),
            quantity_change: movement.quantity_change,
            movement_type: movement.movement_type,
            prev_quantity,
            new_quantity,
            note: movement.note.clone(),
            created_at: Utc::now(),
        };

        debug!(
            product_id = %entry.product_id,
            branch_id = %entry.branch_id,
            movement = ?entry.movement_type,
            delta = entry.quantity_change,
            prev = prev_quantity,
            new = new_quantity,
            "Recording stock movement"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_logs (
                id, product_id, branch_id, user_id, quantity_change,
                movement_type, prev_quantity, new_quantity, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.product_id)
        .bind(&entry.branch_id)
        .bind(&entry.user_id)
        .bind(entry.quantity_change)
        .bind(entry.movement_type)
        .bind(entry.prev_quantity)
        .bind(entry.new_quantity)
        .bind(&entry.note)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(entry)
    }

    /// Lists log entries, most recent first, optionally for one branch.
    ///
    /// Read-only, no side effects. A `limit` of 0 selects the default
    /// page size; anything above the hard ceiling is capped. The
    /// tie-break on rowid keeps entries written in the same millisecond
    /// in insertion order.
    pub async fn list(
        &self,
        branch_id: Option<&str>,
        limit: u32,
    ) -> DbResult<Vec<StockLogEntry>> {
        let limit = if limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            limit.min(MAX_PAGE_SIZE)
        } as i64;

        let entries = match branch_id {
            Some(branch_id) => {
                sqlx::query_as::<_, StockLogEntry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM stock_logs \
                     WHERE branch_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ))
                .bind(branch_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StockLogEntry>(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM stock_logs \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(entries)
    }

    /// Full movement history for one (product, branch), oldest first.
    ///
    /// This is the replay order: applying `quantity_change` from 0 must
    /// reproduce every prev/new pair and end at the current quantity.
    pub async fn history(
        &self,
        product_id: &str,
        branch_id: &str,
    ) -> DbResult<Vec<StockLogEntry>> {
        let entries = sqlx::query_as::<_, StockLogEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM stock_logs \
             WHERE product_id = ?1 AND branch_id = ?2 \
             ORDER BY created_at ASC, rowid ASC"
        ))
        .bind(product_id)
        .bind(branch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Replays the movement log for one (product, branch) from 0.
    ///
    /// Returns the quantity the log says the ledger should hold. Equal to
    /// the inventory quantity in every committed state.
    pub async fn replay_quantity(&self, product_id: &str, branch_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_change), 0) FROM stock_logs \
             WHERE product_id = ?1 AND branch_id = ?2",
        )
        .bind(product_id)
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Removes all log rows for a product (entity-deletion cascade).
    pub async fn delete_for_product(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM stock_logs WHERE product_id = ?1")
            .bind(product_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    /// Removes all log rows for a branch (entity-deletion cascade).
    pub async fn delete_for_branch(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM stock_logs WHERE branch_id = ?1")
            .bind(branch_id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
