//! # Stock Operation Engine
//!
//! The three money-and-goods-moving operations - Receive, Transfer, Sell -
//! plus the guarded entity deletions, each executed as one atomic,
//! consistency-preserving transaction.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │            One engine operation = one serialized unit               │
//! │                                                                     │
//! │  validate inputs (pure, atlas-core)          ← no lock held yet     │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  BEGIN IMMEDIATE            ← write lock up front, bounded wait     │
//! │       │                                                             │
//! │       ├─ catalog lookups (existence, names for errors)              │
//! │       ├─ read current quantities, check invariants                  │
//! │       ├─ audit recorder appends log entries (reads prev qty FIRST)  │
//! │       ├─ ledger store writes new quantities                         │
//! │       └─ order recorder persists the sale (Sell only)               │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  COMMIT on Ok / ROLLBACK on Err  ← all effects or none              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! IMMEDIATE matters: a deferred transaction would let two checkouts read
//! the same pre-decrement quantity and race to commit decrements that
//! together oversell the shelf. With the write lock held from the first
//! read, concurrent operations on the same database serialize; waiting is
//! bounded by `busy_timeout` and a timeout surfaces as the retryable
//! [`EngineError::Contention`].
//!
//! Within a checkout, items are processed in ascending product id. Two
//! concurrent multi-item sales that share products therefore acquire
//! their rows in the same order on any backend that locks per row, and
//! succeed or fail deterministically rather than by arrival order.

use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Sqlite, SqliteConnection};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::pool::Database;
use atlas_core::{
    validation, CheckoutItem, CheckoutSummary, CoreError, Identity, Movement, MovementType,
    Order, OrderItem, OrderStatus,
};

// =============================================================================
// Engine Error
// =============================================================================

/// Everything an engine operation can report.
///
/// All variants are machine-distinguishable; callers must not assume any
/// state changed when they receive an error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Pure rule violation (invalid quantity, same-branch transfer,
    /// empty cart, ...) - rejected before any transaction was opened.
    #[error(transparent)]
    Rule(#[from] CoreError),

    /// Not enough stock at the branch; carries what was actually on hand.
    #[error("Insufficient stock for \"{product}\": available {available}, requested {requested}")]
    InsufficientStock {
        product: String,
        available: i64,
        requested: i64,
    },

    /// Unknown product or branch.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Checkout requires an identity with an active branch.
    #[error("Checkout requires an active branch in the identity context")]
    NoActiveBranch,

    /// Deletion refused: the entity appears in sales history.
    #[error("{entity} {id} has sales history and cannot be deleted")]
    HasHistory { entity: &'static str, id: String },

    /// The write lock could not be acquired within the configured wait.
    /// The transaction had no effect; safe to retry.
    #[error("Ledger is busy, retry the operation")]
    Contention,

    /// Any other storage failure. The transaction was rolled back.
    #[error("Storage failure: {0}")]
    Storage(DbError),
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Busy => EngineError::Contention,
            other => EngineError::Storage(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

fn product_not_found(id: &str) -> EngineError {
    EngineError::NotFound {
        entity: "Product",
        id: id.to_string(),
    }
}

fn branch_not_found(id: &str) -> EngineError {
    EngineError::NotFound {
        entity: "Branch",
        id: id.to_string(),
    }
}

// =============================================================================
// Stock Engine
// =============================================================================

/// The stock operation engine.
///
/// Cheap to clone (shares the pool); one instance per caller is fine.
#[derive(Debug, Clone)]
pub struct StockEngine {
    db: Database,
}

impl StockEngine {
    /// Creates an engine over an open database.
    pub fn new(db: Database) -> Self {
        StockEngine { db }
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Books incoming stock into a branch.
    ///
    /// Returns the updated quantity. The audit entry's `prev_quantity`
    /// reflects the value before this operation's write: the recorder
    /// reads before the engine writes, inside the same transaction.
    ///
    /// ## Errors
    /// - [`CoreError::InvalidQuantity`] for `quantity <= 0`
    /// - [`EngineError::NotFound`] for unknown product or branch
    pub async fn receive(
        &self,
        product_id: &str,
        branch_id: &str,
        quantity: i64,
        identity: &Identity,
        note: Option<&str>,
    ) -> EngineResult<i64> {
        validation::validate_quantity(quantity)?;

        let mut conn = self.db.begin_immediate().await?;
        let result = self
            .receive_in_tx(&mut conn, product_id, branch_id, quantity, identity, note)
            .await;
        let new_quantity = finish(conn, result).await?;

        info!(
            product_id,
            branch_id,
            quantity,
            new_quantity,
            user_id = %identity.user_id,
            "Stock received"
        );

        Ok(new_quantity)
    }

    async fn receive_in_tx(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        branch_id: &str,
        quantity: i64,
        identity: &Identity,
        note: Option<&str>,
    ) -> EngineResult<i64> {
        let catalog = self.db.catalog();

        catalog
            .get_product_tx(conn, product_id)
            .await?
            .ok_or_else(|| product_not_found(product_id))?;
        catalog
            .get_branch_tx(conn, branch_id)
            .await?
            .ok_or_else(|| branch_not_found(branch_id))?;

        // Log first (captures prev quantity), then write the ledger.
        let entry = self
            .db
            .stock_logs()
            .record(
                conn,
                &Movement {
                    product_id,
                    branch_id,
                    user_id: &identity.user_id,
                    quantity_change: quantity,
                    movement_type: MovementType::Receive,
                    note: note.map(str::to_string),
                },
            )
            .await?;

        self.db
            .inventory()
            .set_quantity(conn, product_id, branch_id, entry.new_quantity)
            .await?;

        Ok(entry.new_quantity)
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Moves stock between two branches.
    ///
    /// Conservation law: the product's total quantity across source and
    /// destination is identical before and after a successful transfer.
    /// A failure at any step leaves both branches untouched.
    ///
    /// ## Errors
    /// - [`CoreError::SameBranchTransfer`] / [`CoreError::InvalidQuantity`]
    /// - [`EngineError::InsufficientStock`] if the source holds less than
    ///   requested (no partial effect)
    pub async fn transfer(
        &self,
        product_id: &str,
        from_branch_id: &str,
        to_branch_id: &str,
        quantity: i64,
        identity: &Identity,
    ) -> EngineResult<()> {
        validation::validate_transfer_branches(from_branch_id, to_branch_id)?;
        validation::validate_quantity(quantity)?;

        let mut conn = self.db.begin_immediate().await?;
        let result = self
            .transfer_in_tx(
                &mut conn,
                product_id,
                from_branch_id,
                to_branch_id,
                quantity,
                identity,
            )
            .await;
        finish(conn, result).await?;

        info!(
            product_id,
            from_branch_id,
            to_branch_id,
            quantity,
            user_id = %identity.user_id,
            "Stock transferred"
        );

        Ok(())
    }

    async fn transfer_in_tx(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        from_branch_id: &str,
        to_branch_id: &str,
        quantity: i64,
        identity: &Identity,
    ) -> EngineResult<()> {
        let catalog = self.db.catalog();
        let inventory = self.db.inventory();
        let logs = self.db.stock_logs();

        let product = catalog
            .get_product_tx(conn, product_id)
            .await?
            .ok_or_else(|| product_not_found(product_id))?;
        let from_branch = catalog
            .get_branch_tx(conn, from_branch_id)
            .await?
            .ok_or_else(|| branch_not_found(from_branch_id))?;
        let to_branch = catalog
            .get_branch_tx(conn, to_branch_id)
            .await?
            .ok_or_else(|| branch_not_found(to_branch_id))?;

        let available = inventory.get_quantity(conn, product_id, from_branch_id).await?;
        if available < quantity {
            warn!(
                product_id,
                from_branch_id, available, requested = quantity, "Transfer refused"
            );
            return Err(EngineError::InsufficientStock {
                product: product.name,
                available,
                requested: quantity,
            });
        }

        // Both legs log their own pre-transaction quantities, then the
        // ledger writes follow. Keys differ, so the out-leg write cannot
        // disturb the in-leg's prev read.
        let out_entry = logs
            .record(
                conn,
                &Movement {
                    product_id,
                    branch_id: from_branch_id,
                    user_id: &identity.user_id,
                    quantity_change: -quantity,
                    movement_type: MovementType::TransferOut,
                    note: Some(format!("Transfer to {}", to_branch.name)),
                },
            )
            .await?;
        let in_entry = logs
            .record(
                conn,
                &Movement {
                    product_id,
                    branch_id: to_branch_id,
                    user_id: &identity.user_id,
                    quantity_change: quantity,
                    movement_type: MovementType::TransferIn,
                    note: Some(format!("Transfer from {}", from_branch.name)),
                },
            )
            .await?;

        inventory
            .set_quantity(conn, product_id, from_branch_id, out_entry.new_quantity)
            .await?;
        inventory
            .set_quantity(conn, product_id, to_branch_id, in_entry.new_quantity)
            .await?;

        Ok(())
    }

    // =========================================================================
    // Sell
    // =========================================================================

    /// Point-of-sale checkout: persists the order and depletes stock as
    /// one unit.
    ///
    /// Items are charged at the supplied unit prices (what the cashier
    /// saw), not re-read from the catalog. Any line with insufficient
    /// stock aborts the entire sale: no order, no quantity change.
    ///
    /// ## Errors
    /// - [`CoreError::EmptyCart`] / [`CoreError::InvalidQuantity`]
    /// - [`EngineError::NoActiveBranch`] if the identity has no branch
    /// - [`EngineError::InsufficientStock`] naming the offending product
    pub async fn sell(
        &self,
        items: &[CheckoutItem],
        identity: &Identity,
    ) -> EngineResult<CheckoutSummary> {
        validation::validate_checkout(items)?;

        let branch_id = identity
            .active_branch_id
            .as_deref()
            .ok_or(EngineError::NoActiveBranch)?;

        let total = atlas_core::money::cart_total(
            items.iter().map(|item| (item.unit_price(), item.quantity)),
        )
        .map_err(EngineError::Rule)?;

        let mut conn = self.db.begin_immediate().await?;
        let result = self
            .sell_in_tx(&mut conn, items, branch_id, identity, total.cents())
            .await;
        let summary = finish(conn, result).await?;

        info!(
            order_id = %summary.order_id,
            branch_id,
            user_id = %identity.user_id,
            total_cents = summary.total_cents,
            lines = items.len(),
            "Checkout completed"
        );

        Ok(summary)
    }

    async fn sell_in_tx(
        &self,
        conn: &mut SqliteConnection,
        items: &[CheckoutItem],
        branch_id: &str,
        identity: &Identity,
        total_cents: i64,
    ) -> EngineResult<CheckoutSummary> {
        let catalog = self.db.catalog();
        let inventory = self.db.inventory();
        let logs = self.db.stock_logs();

        catalog
            .get_branch_tx(conn, branch_id)
            .await?
            .ok_or_else(|| branch_not_found(branch_id))?;

        // Fixed deterministic processing order: ascending product id.
        let mut sorted: Vec<&CheckoutItem> = items.iter().collect();
        sorted.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        let mut lines = Vec::with_capacity(sorted.len());
        for item in sorted {
            let product = catalog
                .get_product_tx(conn, &item.product_id)
                .await?
                .ok_or_else(|| product_not_found(&item.product_id))?;
            lines.push((item, product));
        }

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            branch_id: branch_id.to_string(),
            user_id: identity.user_id.clone(),
            total_cents,
            status: OrderStatus::Completed,
            created_at: now,
        };
        // Line items keep the cart's order for the receipt; the price is
        // the supplied snapshot, not the catalog price.
        let order_items: Vec<OrderItem> = items
            .iter()
            .map(|item| OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                created_at: now,
            })
            .collect();

        self.db.orders().insert_order(conn, &order, &order_items).await?;

        for (item, product) in lines {
            let available = inventory
                .get_quantity(conn, &item.product_id, branch_id)
                .await?;
            if available < item.quantity {
                warn!(
                    product_id = %item.product_id,
                    branch_id,
                    available,
                    requested = item.quantity,
                    "Checkout refused"
                );
                return Err(EngineError::InsufficientStock {
                    product: product.name,
                    available,
                    requested: item.quantity,
                });
            }

            let entry = logs
                .record(
                    conn,
                    &Movement {
                        product_id: &item.product_id,
                        branch_id,
                        user_id: &identity.user_id,
                        quantity_change: -item.quantity,
                        movement_type: MovementType::Sale,
                        note: Some(format!("Sold on order #{}", order.id)),
                    },
                )
                .await?;

            inventory
                .set_quantity(conn, &item.product_id, branch_id, entry.new_quantity)
                .await?;
        }

        Ok(CheckoutSummary {
            order_id: order.id,
            total_cents,
        })
    }

    // =========================================================================
    // Guarded Deletions
    // =========================================================================

    /// Deletes a product, refusing if it appears in any sale.
    ///
    /// Without history, the product's inventory and stock log rows are
    /// removed with it as a single transaction.
    pub async fn delete_product(&self, product_id: &str) -> EngineResult<()> {
        let mut conn = self.db.begin_immediate().await?;
        let result = self.delete_product_in_tx(&mut conn, product_id).await;
        finish(conn, result).await?;

        info!(product_id, "Product deleted");
        Ok(())
    }

    async fn delete_product_in_tx(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> EngineResult<()> {
        if self
            .db
            .orders()
            .has_history_for_product(conn, product_id)
            .await?
        {
            return Err(EngineError::HasHistory {
                entity: "Product",
                id: product_id.to_string(),
            });
        }

        self.db.inventory().delete_for_product(conn, product_id).await?;
        self.db.stock_logs().delete_for_product(conn, product_id).await?;

        let rows = self.db.catalog().delete_product_row(conn, product_id).await?;
        if rows == 0 {
            return Err(product_not_found(product_id));
        }

        Ok(())
    }

    /// Deletes a branch, refusing if it has any sales history.
    ///
    /// Without history, the branch's inventory and stock log rows are
    /// removed with it as a single transaction.
    pub async fn delete_branch(&self, branch_id: &str) -> EngineResult<()> {
        let mut conn = self.db.begin_immediate().await?;
        let result = self.delete_branch_in_tx(&mut conn, branch_id).await;
        finish(conn, result).await?;

        info!(branch_id, "Branch deleted");
        Ok(())
    }

    async fn delete_branch_in_tx(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
    ) -> EngineResult<()> {
        if self
            .db
            .orders()
            .has_history_for_branch(conn, branch_id)
            .await?
        {
            return Err(EngineError::HasHistory {
                entity: "Branch",
                id: branch_id.to_string(),
            });
        }

        self.db.inventory().delete_for_branch(conn, branch_id).await?;
        self.db.stock_logs().delete_for_branch(conn, branch_id).await?;

        let rows = self.db.catalog().delete_branch_row(conn, branch_id).await?;
        if rows == 0 {
            return Err(branch_not_found(branch_id));
        }

        Ok(())
    }
}

// =============================================================================
// Transaction Finish
// =============================================================================

/// Commits on Ok, rolls back on Err, and returns the result.
///
/// sqlx does not reset a manually opened transaction when a connection
/// returns to the pool, so this function must never hand a connection
/// back with the transaction still open. A failed COMMIT falls through
/// to ROLLBACK; a failed ROLLBACK discards the connection.
async fn finish<T>(
    mut conn: PoolConnection<Sqlite>,
    result: EngineResult<T>,
) -> EngineResult<T> {
    match result {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(value),
            Err(commit_err) => {
                warn!(error = %commit_err, "Commit failed");
                abort(conn).await;
                Err(DbError::from(commit_err).into())
            }
        },
        Err(err) => {
            abort(conn).await;
            Err(err)
        }
    }
}

/// Rolls the open transaction back. If the rollback itself fails the
/// connection is in an unknown transaction state; it is detached from
/// the pool and closed rather than recycled.
async fn abort(mut conn: PoolConnection<Sqlite>) {
    if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!(error = %rollback_err, "Rollback failed, discarding connection");
        if let Err(close_err) = conn.detach().close().await {
            warn!(error = %close_err, "Discarded connection did not close cleanly");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use atlas_core::{Branch, Product};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn seed_product(db: &Database, id: &str, name: &str, price_cents: i64) {
        db.catalog()
            .insert_product(&Product {
                id: id.to_string(),
                name: name.to_string(),
                price_cents,
                cost_price_cents: 0,
                barcode: None,
                category: None,
                unit: None,
                image: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    async fn seed_branch(db: &Database, id: &str, name: &str) {
        db.catalog()
            .insert_branch(&Branch {
                id: id.to_string(),
                name: name.to_string(),
                location: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    /// Standard fixture: product P1 at 1.45, branches B1 and B2.
    async fn fixture() -> Database {
        let db = test_db().await;
        seed_product(&db, "P1", "Drip Coffee 250g", 145).await;
        seed_branch(&db, "B1", "Main Branch").await;
        seed_branch(&db, "B2", "Second Branch").await;
        db
    }

    async fn stock(db: &Database, product_id: &str, branch_id: &str) -> i64 {
        db.inventory().quantity(product_id, branch_id).await.unwrap()
    }

    fn line(product_id: &str, quantity: i64, unit_price_cents: i64) -> CheckoutItem {
        CheckoutItem {
            product_id: product_id.to_string(),
            quantity,
            unit_price_cents,
        }
    }

    // -------------------------------------------------------------------------
    // Receive
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn receive_adds_stock_and_logs_prev_new() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 10, &clerk, None).await.unwrap();

        // Scenario: 10 on hand, receive 5 more
        let updated = engine
            .receive("P1", "B1", 5, &clerk, Some("weekly delivery"))
            .await
            .unwrap();

        assert_eq!(updated, 15);
        assert_eq!(stock(&db, "P1", "B1").await, 15);

        let history = db.stock_logs().history("P1", "B1").await.unwrap();
        assert_eq!(history.len(), 2);

        let second = &history[1];
        assert_eq!(second.movement_type, MovementType::Receive);
        assert_eq!(second.quantity_change, 5);
        assert_eq!(second.prev_quantity, 10);
        assert_eq!(second.new_quantity, 15);
        assert_eq!(second.user_id, "U1");
        assert_eq!(second.note.as_deref(), Some("weekly delivery"));
    }

    #[tokio::test]
    async fn receive_creates_inventory_lazily() {
        let db = fixture().await;
        let engine = db.engine();

        assert!(db.inventory().get("P1", "B1").await.unwrap().is_none());

        engine
            .receive("P1", "B1", 7, &Identity::new("U1"), None)
            .await
            .unwrap();

        let record = db.inventory().get("P1", "B1").await.unwrap().unwrap();
        assert_eq!(record.quantity, 7);
    }

    #[tokio::test]
    async fn receive_rejects_non_positive_quantity() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        for bad in [0, -5] {
            let err = engine.receive("P1", "B1", bad, &clerk, None).await.unwrap_err();
            assert!(matches!(
                err,
                EngineError::Rule(CoreError::InvalidQuantity { .. })
            ));
        }

        // Nothing was written
        assert_eq!(stock(&db, "P1", "B1").await, 0);
        assert!(db.stock_logs().list(None, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn receive_rejects_unknown_product_and_branch() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        let err = engine.receive("NOPE", "B1", 1, &clerk, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "Product", .. }));

        let err = engine.receive("P1", "NOPE", 1, &clerk, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "Branch", .. }));
    }

    // -------------------------------------------------------------------------
    // Transfer
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn transfer_moves_stock_and_conserves_total() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 10, &clerk, None).await.unwrap();

        let before = stock(&db, "P1", "B1").await + stock(&db, "P1", "B2").await;

        engine.transfer("P1", "B1", "B2", 10, &clerk).await.unwrap();

        assert_eq!(stock(&db, "P1", "B1").await, 0);
        assert_eq!(stock(&db, "P1", "B2").await, 10);

        let after = stock(&db, "P1", "B1").await + stock(&db, "P1", "B2").await;
        assert_eq!(before, after);

        // Two legs, each logged against its own pre-transfer quantity
        let out = db.stock_logs().history("P1", "B1").await.unwrap();
        let out = out.last().unwrap();
        assert_eq!(out.movement_type, MovementType::TransferOut);
        assert_eq!(out.prev_quantity, 10);
        assert_eq!(out.new_quantity, 0);

        let in_ = db.stock_logs().history("P1", "B2").await.unwrap();
        let in_ = in_.last().unwrap();
        assert_eq!(in_.movement_type, MovementType::TransferIn);
        assert_eq!(in_.prev_quantity, 0);
        assert_eq!(in_.new_quantity, 10);
    }

    #[tokio::test]
    async fn transfer_insufficient_stock_has_no_partial_effect() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 10, &clerk, None).await.unwrap();
        let logs_before = db.stock_logs().list(None, 100).await.unwrap().len();

        let err = engine.transfer("P1", "B1", "B2", 100, &clerk).await.unwrap_err();
        match err {
            EngineError::InsufficientStock {
                product,
                available,
                requested,
            } => {
                assert_eq!(product, "Drip Coffee 250g");
                assert_eq!(available, 10);
                assert_eq!(requested, 100);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        // Both branches untouched, no stray log entries
        assert_eq!(stock(&db, "P1", "B1").await, 10);
        assert_eq!(stock(&db, "P1", "B2").await, 0);
        assert_eq!(
            db.stock_logs().list(None, 100).await.unwrap().len(),
            logs_before
        );
    }

    #[tokio::test]
    async fn transfer_rejects_same_branch_and_bad_quantity() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        let err = engine.transfer("P1", "B1", "B1", 5, &clerk).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Rule(CoreError::SameBranchTransfer)
        ));

        let err = engine.transfer("P1", "B1", "B2", 0, &clerk).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Rule(CoreError::InvalidQuantity { .. })
        ));
    }

    // -------------------------------------------------------------------------
    // Sell
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn sell_creates_order_and_depletes_stock() {
        let db = fixture().await;
        let engine = db.engine();
        let cashier = Identity::at_branch("U1", "B1");

        engine
            .receive("P1", "B1", 15, &Identity::new("U1"), None)
            .await
            .unwrap();

        // Scenario: 3 units at 1.45 each
        let summary = engine.sell(&[line("P1", 3, 145)], &cashier).await.unwrap();

        assert_eq!(summary.total_cents, 435);
        assert_eq!(stock(&db, "P1", "B1").await, 12);

        let order = db
            .orders()
            .get_with_items(&summary.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.order.status, OrderStatus::Completed);
        assert_eq!(order.order.total_cents, 435);
        assert_eq!(order.order.user_id, "U1");
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 3);
        assert_eq!(order.items[0].unit_price_cents, 145);

        let sale_log = db.stock_logs().history("P1", "B1").await.unwrap();
        let sale_log = sale_log.last().unwrap();
        assert_eq!(sale_log.movement_type, MovementType::Sale);
        assert_eq!(sale_log.prev_quantity, 15);
        assert_eq!(sale_log.new_quantity, 12);
        assert!(sale_log
            .note
            .as_deref()
            .unwrap()
            .contains(&summary.order_id));
    }

    #[tokio::test]
    async fn sell_uses_supplied_prices_not_catalog() {
        let db = fixture().await;
        let engine = db.engine();
        let cashier = Identity::at_branch("U1", "B1");

        engine
            .receive("P1", "B1", 10, &Identity::new("U1"), None)
            .await
            .unwrap();

        // Catalog says 145; the cart was shown 120
        let summary = engine.sell(&[line("P1", 2, 120)], &cashier).await.unwrap();
        assert_eq!(summary.total_cents, 240);
    }

    #[tokio::test]
    async fn sell_rejects_empty_cart() {
        let db = fixture().await;
        let engine = db.engine();

        let err = engine
            .sell(&[], &Identity::at_branch("U1", "B1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Rule(CoreError::EmptyCart)));
    }

    #[tokio::test]
    async fn sell_requires_active_branch() {
        let db = fixture().await;
        let engine = db.engine();

        let err = engine
            .sell(&[line("P1", 1, 145)], &Identity::new("U1"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoActiveBranch));
    }

    #[tokio::test]
    async fn sell_is_atomic_across_items() {
        let db = fixture().await;
        seed_product(&db, "P2", "Espresso Beans 1kg", 1800).await;
        let engine = db.engine();
        let cashier = Identity::at_branch("U1", "B1");
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 10, &clerk, None).await.unwrap();
        engine.receive("P2", "B1", 1, &clerk, None).await.unwrap();

        let orders_before = db.orders().list(None, 100).await.unwrap().len();

        // P1 line is satisfiable, P2 line is not: the whole sale aborts
        let err = engine
            .sell(&[line("P1", 2, 145), line("P2", 5, 1800)], &cashier)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock { available: 1, requested: 5, .. }
        ));

        assert_eq!(stock(&db, "P1", "B1").await, 10);
        assert_eq!(stock(&db, "P2", "B1").await, 1);
        assert_eq!(db.orders().list(None, 100).await.unwrap().len(), orders_before);
    }

    #[tokio::test]
    async fn sell_processes_duplicate_product_lines_cumulatively() {
        let db = fixture().await;
        let engine = db.engine();
        let cashier = Identity::at_branch("U1", "B1");

        engine
            .receive("P1", "B1", 3, &Identity::new("U1"), None)
            .await
            .unwrap();

        // Two lines for the same product, together exceeding stock
        let err = engine
            .sell(&[line("P1", 2, 145), line("P1", 2, 145)], &cashier)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::InsufficientStock { available: 1, requested: 2, .. }
        ));
        assert_eq!(stock(&db, "P1", "B1").await, 3);

        // And a pair that fits exactly
        engine
            .sell(&[line("P1", 2, 145), line("P1", 1, 145)], &cashier)
            .await
            .unwrap();
        assert_eq!(stock(&db, "P1", "B1").await, 0);
    }

    // -------------------------------------------------------------------------
    // Ledger Properties
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn audit_replay_reproduces_final_quantity() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");
        let cashier = Identity::at_branch("U1", "B1");

        engine.receive("P1", "B1", 20, &clerk, None).await.unwrap();
        engine.transfer("P1", "B1", "B2", 8, &clerk).await.unwrap();
        engine.sell(&[line("P1", 5, 145)], &cashier).await.unwrap();
        engine.receive("P1", "B2", 2, &clerk, None).await.unwrap();

        for branch_id in ["B1", "B2"] {
            let replayed = db.stock_logs().replay_quantity("P1", branch_id).await.unwrap();
            assert_eq!(replayed, stock(&db, "P1", branch_id).await);

            // The prev/new chain must be gapless from 0
            let mut running = 0;
            for entry in db.stock_logs().history("P1", branch_id).await.unwrap() {
                assert_eq!(entry.prev_quantity, running);
                assert_eq!(entry.new_quantity, running + entry.quantity_change);
                running = entry.new_quantity;
                assert!(running >= 0, "committed state went negative");
            }
        }
    }

    #[tokio::test]
    async fn listings_are_ordered_filtered_and_side_effect_free() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 5, &clerk, None).await.unwrap();
        engine.receive("P1", "B2", 3, &clerk, None).await.unwrap();
        engine.transfer("P1", "B2", "B1", 1, &clerk).await.unwrap();
        engine
            .sell(&[line("P1", 2, 145)], &Identity::at_branch("U1", "B1"))
            .await
            .unwrap();

        let all = db.stock_logs().list(None, 100).await.unwrap();
        assert_eq!(all.len(), 5);
        // Most recent first
        assert_eq!(all[0].movement_type, MovementType::Sale);
        for pair in all.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }

        let b2_only = db.stock_logs().list(Some("B2"), 100).await.unwrap();
        assert_eq!(b2_only.len(), 2);
        assert!(b2_only.iter().all(|e| e.branch_id == "B2"));

        // Page bound honored; limit 0 falls back to the default page size
        let page = db.stock_logs().list(None, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        let defaulted = db.stock_logs().list(None, 0).await.unwrap();
        assert_eq!(defaulted.len(), all.len());
        assert_eq!(db.orders().list(None, 0).await.unwrap().len(), 1);

        // Idempotent reads: same answer twice, nothing mutated
        let again = db.stock_logs().list(None, 100).await.unwrap();
        assert_eq!(all.len(), again.len());
        assert_eq!(all[0].id, again[0].id);

        let orders = db.orders().list(Some("B1"), 100).await.unwrap();
        let orders_again = db.orders().list(Some("B1"), 100).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].items.len(), 1);
        assert_eq!(orders_again[0].order.id, orders[0].order.id);
    }

    // -------------------------------------------------------------------------
    // Guarded Deletions
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn delete_product_refused_with_history_cascades_without() {
        let db = fixture().await;
        seed_product(&db, "P2", "Filter Papers", 300).await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 5, &clerk, None).await.unwrap();
        engine.receive("P2", "B1", 5, &clerk, None).await.unwrap();
        engine
            .sell(&[line("P1", 1, 145)], &Identity::at_branch("U1", "B1"))
            .await
            .unwrap();

        // P1 was sold: refused
        let err = engine.delete_product("P1").await.unwrap_err();
        assert!(matches!(err, EngineError::HasHistory { entity: "Product", .. }));
        assert!(db.catalog().get_product("P1").await.unwrap().is_some());

        // P2 never sold: removed together with its ledger rows
        engine.delete_product("P2").await.unwrap();
        assert!(db.catalog().get_product("P2").await.unwrap().is_none());
        assert!(db.inventory().get("P2", "B1").await.unwrap().is_none());
        assert!(db.stock_logs().history("P2", "B1").await.unwrap().is_empty());

        let err = engine.delete_product("P2").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "Product", .. }));
    }

    #[tokio::test]
    async fn delete_branch_refused_with_history_cascades_without() {
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 5, &clerk, None).await.unwrap();
        engine.receive("P1", "B2", 5, &clerk, None).await.unwrap();
        engine
            .sell(&[line("P1", 1, 145)], &Identity::at_branch("U1", "B1"))
            .await
            .unwrap();

        let err = engine.delete_branch("B1").await.unwrap_err();
        assert!(matches!(err, EngineError::HasHistory { entity: "Branch", .. }));

        engine.delete_branch("B2").await.unwrap();
        assert!(db.catalog().get_branch("B2").await.unwrap().is_none());
        assert!(db.inventory().get("P1", "B2").await.unwrap().is_none());
        assert!(db.stock_logs().history("P1", "B2").await.unwrap().is_empty());
    }

    // -------------------------------------------------------------------------
    // Concurrency
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn concurrent_sales_never_oversell() {
        // File-backed database so two connections can race for the write
        // lock; in-memory SQLite is per-connection.
        let path = std::env::temp_dir().join(format!("atlas-engine-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();

        seed_product(&db, "P1", "Last Croissant", 350).await;
        seed_branch(&db, "B1", "Main Branch").await;
        db.engine()
            .receive("P1", "B1", 1, &Identity::new("U0"), None)
            .await
            .unwrap();

        let engine_a = db.engine();
        let engine_b = db.engine();
        let sale_a = tokio::spawn(async move {
            engine_a
                .sell(&[line("P1", 1, 350)], &Identity::at_branch("U1", "B1"))
                .await
        });
        let sale_b = tokio::spawn(async move {
            engine_b
                .sell(&[line("P1", 1, 350)], &Identity::at_branch("U2", "B1"))
                .await
        });

        let result_a = sale_a.await.unwrap();
        let result_b = sale_b.await.unwrap();

        // Exactly one wins; the loser sees the truth, not a torn state
        let successes = [&result_a, &result_b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);

        let loser = if result_a.is_ok() { result_b } else { result_a };
        assert!(matches!(
            loser.unwrap_err(),
            EngineError::InsufficientStock { available: 0, requested: 1, .. }
        ));

        assert_eq!(stock(&db, "P1", "B1").await, 0);
        assert_eq!(db.orders().list(None, 100).await.unwrap().len(), 1);
        assert_eq!(
            db.stock_logs().replay_quantity("P1", "B1").await.unwrap(),
            0
        );

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(path.with_extension(format!("db{suffix}")));
        }
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn held_write_lock_times_out_as_contention() {
        use std::time::Duration;

        let path =
            std::env::temp_dir().join(format!("atlas-contention-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).busy_timeout(Duration::from_millis(200)))
            .await
            .unwrap();
        seed_product(&db, "P1", "Drip Coffee 250g", 145).await;
        seed_branch(&db, "B1", "Main Branch").await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        // A second handle holds the write lock across the whole attempt
        let holder = Database::new(DbConfig::new(&path).run_migrations(false))
            .await
            .unwrap();
        let mut held = holder.begin_immediate().await.unwrap();

        let err = engine.receive("P1", "B1", 5, &clerk, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Contention));

        // The timed-out attempt had no effect
        assert_eq!(stock(&db, "P1", "B1").await, 0);
        assert!(db.stock_logs().history("P1", "B1").await.unwrap().is_empty());

        sqlx::query("ROLLBACK").execute(&mut *held).await.unwrap();
        drop(held);

        // Lock released: the retry goes through
        assert_eq!(engine.receive("P1", "B1", 5, &clerk, None).await.unwrap(), 5);

        holder.close().await;
        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(path.with_extension(format!("db{suffix}")));
        }
        let _ = std::fs::remove_file(&path);
    }

    // -------------------------------------------------------------------------
    // Transaction Hygiene
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn failed_operation_leaves_its_connection_reusable() {
        // The in-memory pool has exactly one connection; a transaction
        // left open by the rollback path would break every later call
        let db = fixture().await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        engine.receive("P1", "B1", 1, &clerk, None).await.unwrap();
        let err = engine.transfer("P1", "B1", "B2", 5, &clerk).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientStock { .. }));

        // Same pooled connection, fresh IMMEDIATE transaction
        let mut conn = db.begin_immediate().await.unwrap();
        sqlx::query("ROLLBACK").execute(&mut *conn).await.unwrap();
        drop(conn);

        assert_eq!(engine.receive("P1", "B1", 2, &clerk, None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn commit_failure_discards_the_connection_instead_of_recycling() {
        // File-backed: when the broken connection is closed, its
        // replacement must still see the same database
        let path = std::env::temp_dir().join(format!("atlas-finish-test-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(1))
            .await
            .unwrap();
        seed_product(&db, "P1", "Drip Coffee 250g", 145).await;
        seed_branch(&db, "B1", "Main Branch").await;
        let engine = db.engine();
        let clerk = Identity::new("U1");

        // A connection whose COMMIT cannot succeed: its transaction was
        // already torn down out from under the finish step
        let mut conn = db.begin_immediate().await.unwrap();
        sqlx::query("ROLLBACK").execute(&mut *conn).await.unwrap();
        let result = finish(conn, Ok(())).await;
        assert!(matches!(result, Err(EngineError::Storage(_))));

        // The pool's only slot was freed by closing the broken
        // connection; the next operation runs on a fresh one
        assert_eq!(engine.receive("P1", "B1", 4, &clerk, None).await.unwrap(), 4);
        assert_eq!(stock(&db, "P1", "B1").await, 4);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(path.with_extension(format!("db{suffix}")));
        }
        let _ = std::fs::remove_file(&path);
    }
}
