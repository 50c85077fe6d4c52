//! # Domain Types
//!
//! Core domain types for the Atlas POS inventory ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                │
//! │                                                                     │
//! │  Catalog (external CRUD)      Ledger (owned by this core)           │
//! │  ┌─────────────────┐          ┌─────────────────┐                   │
//! │  │    Product      │          │   Inventory     │ one row per       │
//! │  │    Branch       │          │  (product,      │ (product, branch) │
//! │  └─────────────────┘          │   branch) → qty │                   │
//! │                               └─────────────────┘                   │
//! │                               ┌─────────────────┐                   │
//! │  Sales (write-once)           │  StockLogEntry  │ append-only       │
//! │  ┌─────────────────┐          │  signed delta + │ audit trail       │
//! │  │ Order           │          │  prev/new qty   │                   │
//! │  │ └─ OrderItem    │          └─────────────────┘                   │
//! │  └─────────────────┘                                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All quantities are `i64` and never negative in committed state; all
//! prices are integer cents (see [`crate::money`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Catalog Entities (referenced, not owned)
// =============================================================================

/// A product in the catalog.
///
/// Immutable with respect to the ledger core: created and edited by catalog
/// CRUD, read here for existence checks and error context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name shown to the cashier and in error messages.
    pub name: String,

    /// Unit sale price in cents.
    pub price_cents: i64,

    /// Unit cost price in cents (margin reporting).
    pub cost_price_cents: i64,

    /// Barcode (unique when present).
    pub barcode: Option<String>,

    /// Optional category reference.
    pub category: Option<String>,

    /// Optional sale unit reference ("bottle", "kg", ...).
    pub unit: Option<String>,

    /// Optional image reference.
    pub image: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// A physical branch holding stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name ("Main Branch").
    pub name: String,

    /// Optional street address or description.
    pub location: Option<String>,

    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Ledger State
// =============================================================================

/// The mutable ledger state: one row per (product, branch) pair.
///
/// ## Ownership
/// Written exclusively by the ledger store inside engine transactions.
/// Created lazily on the first stock movement into a branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    pub product_id: String,
    pub branch_id: String,

    /// On-hand quantity. Never negative in any committed state.
    pub quantity: i64,

    pub updated_at: DateTime<Utc>,
}

/// The kind of stock movement an audit entry records.
///
/// Stored as TEXT (`RECEIVE`, `SALE`, `TRANSFER_OUT`, `TRANSFER_IN`,
/// `ADJUSTMENT`). `Adjustment` is reserved for manual corrections and is
/// not emitted by any engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Stock intake from a supplier.
    Receive,
    /// Point-of-sale depletion.
    Sale,
    /// Outbound leg of an inter-branch transfer.
    TransferOut,
    /// Inbound leg of an inter-branch transfer.
    TransferIn,
    /// Manual correction.
    Adjustment,
}

/// One append-only audit record for a stock movement.
///
/// ## Replay Invariant
/// For a given (product, branch), replaying `quantity_change` in creation
/// order from 0 reproduces every `prev_quantity`/`new_quantity` pair and
/// terminates at the current inventory quantity. Rows are never mutated
/// or deleted while the entity they describe exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct StockLogEntry {
    pub id: String,
    pub product_id: String,
    pub branch_id: String,

    /// The user who triggered the movement.
    pub user_id: String,

    /// Signed delta applied to the quantity.
    pub quantity_change: i64,

    /// Movement kind.
    #[serde(rename = "type")]
    pub movement_type: MovementType,

    /// Quantity before this movement, as read inside the same transaction.
    pub prev_quantity: i64,

    /// Quantity after this movement (= prev_quantity + quantity_change).
    pub new_quantity: i64,

    /// Free-text note ("order #...", "transfer to ...").
    pub note: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// A movement about to be recorded, before prev/new quantities are known.
///
/// The audit recorder fills in `prev_quantity`/`new_quantity` by reading
/// the ledger inside the caller's transaction.
#[derive(Debug, Clone)]
pub struct Movement<'a> {
    pub product_id: &'a str,
    pub branch_id: &'a str,
    pub user_id: &'a str,
    pub quantity_change: i64,
    pub movement_type: MovementType,
    pub note: Option<String>,
}

// =============================================================================
// Sales
// =============================================================================

/// Order lifecycle state.
///
/// This core knows exactly one reachable state: orders are created
/// `Completed`. No draft/pending/cancelled states exist in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Completed,
}

/// One completed sale.
///
/// Write-once: no edits and no deletes once committed. Deletion of the
/// branch or any sold product is blocked by referential guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub branch_id: String,

    /// The cashier.
    pub user_id: String,

    /// Sum of line extended prices, in cents.
    pub total_cents: i64,

    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// One line of an order.
///
/// ## Snapshot Pattern
/// `unit_price_cents` is the price captured at sale time, not a live
/// reference to the catalog. Historical totals never drift when a product
/// is repriced later.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// An order with its line items, as returned by order listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

// =============================================================================
// Engine Inputs
// =============================================================================

/// One line of a checkout request.
///
/// The unit price is supplied by the caller (the cart), not re-read from
/// the catalog, so what the cashier saw is what gets charged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
}

impl CheckoutItem {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }
}

/// Result of a successful checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSummary {
    pub order_id: String,
    pub total_cents: i64,
}

/// Resolved identity context threaded into every engine call.
///
/// Supplied by the external authentication/session layer; the engine
/// trusts it as already authorized. Collapsing session lookup into one
/// value keeps the engine free of ad hoc session resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// The acting user, attributed on every audit entry.
    pub user_id: String,

    /// The branch this session is operating in (required for checkout).
    pub active_branch_id: Option<String>,
}

impl Identity {
    /// Identity with no active branch (stock intake / transfer forms).
    pub fn new(user_id: impl Into<String>) -> Self {
        Identity {
            user_id: user_id.into(),
            active_branch_id: None,
        }
    }

    /// Identity operating at a branch (POS checkout).
    pub fn at_branch(user_id: impl Into<String>, branch_id: impl Into<String>) -> Self {
        Identity {
            user_id: user_id.into(),
            active_branch_id: Some(branch_id.into()),
        }
    }
}
