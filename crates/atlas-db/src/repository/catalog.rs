//! # Catalog Repository
//!
//! Read-mostly lookups for products and branches.
//!
//! Catalog CRUD is an external concern; the ledger core only needs
//! existence checks and display names for error context, plus inserts to
//! support seeding and tests, plus the row deletions that the engine's
//! guarded delete operations cascade through.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use atlas_core::{Branch, Product};

const PRODUCT_COLUMNS: &str =
    "id, name, price_cents, cost_price_cents, barcode, category, unit, image, created_at";

/// Repository for product and branch lookups.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// Inserts a product (seeding / tests).
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, price_cents, cost_price_cents,
                barcode, category, unit, image, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.cost_price_cents)
        .bind(&product.barcode)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(&product.image)
        .bind(product.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets a product by ID inside the caller's transaction.
    pub async fn get_product_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(product)
    }

    /// Deletes the product row itself (after cascades). Returns rows
    /// affected so the engine can distinguish a missing product.
    pub async fn delete_product_row(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// Inserts a branch (seeding / tests).
    pub async fn insert_branch(&self, branch: &Branch) -> DbResult<()> {
        debug!(id = %branch.id, name = %branch.name, "Inserting branch");

        sqlx::query(
            "INSERT INTO branches (id, name, location, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&branch.id)
        .bind(&branch.name)
        .bind(&branch.location)
        .bind(branch.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a branch by ID.
    pub async fn get_branch(&self, id: &str) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(
            "SELECT id, name, location, created_at FROM branches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(branch)
    }

    /// Gets a branch by ID inside the caller's transaction.
    pub async fn get_branch_tx(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<Branch>> {
        let branch = sqlx::query_as::<_, Branch>(
            "SELECT id, name, location, created_at FROM branches WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(branch)
    }

    /// Deletes the branch row itself (after cascades). Returns rows
    /// affected so the engine can distinguish a missing branch.
    pub async fn delete_branch_row(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM branches WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected())
    }
}
