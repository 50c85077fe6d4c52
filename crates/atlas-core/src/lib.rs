//! # atlas-core: Pure Business Logic for Atlas POS
//!
//! This crate is the I/O-free heart of the Atlas POS inventory ledger.
//! It defines the domain types shared between the persistence layer and
//! callers, the integer money arithmetic, and the input validation rules
//! that the Stock Operation Engine enforces before it ever opens a
//! transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Atlas POS Data Flow                            │
//! │                                                                     │
//! │   POS checkout / stock intake / transfer form                       │
//! │        │                                                            │
//! │        ▼                                                            │
//! │   atlas-db::StockEngine  (transactions, invariants)                 │
//! │        │                                                            │
//! │        ▼                                                            │
//! │   ★ atlas-core (THIS CRATE) ★                                       │
//! │        types • money • validation • error                           │
//! │                                                                     │
//! │   NO I/O • NO DATABASE • PURE FUNCTIONS                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Branch, Inventory, StockLogEntry, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for the engine operations

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum line items allowed in a single checkout.
///
/// Prevents runaway carts; one transaction holding the write lock for
/// hundreds of items would stall every other register.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity for a single stock movement or cart line.
///
/// Catches fat-finger input (typing 10000 instead of 10) before it
/// reaches the ledger.
pub const MAX_MOVEMENT_QUANTITY: i64 = 999_999;

/// Default page size for stock log and order listings, applied when the
/// caller passes a limit of 0.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
