//! # Error Types
//!
//! Domain-specific error types for atlas-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                 │
//! │                                                                     │
//! │  atlas-core errors (this file)                                      │
//! │  └── CoreError     - Pure rule violations, checkable without I/O    │
//! │                                                                     │
//! │  atlas-db errors (separate crate)                                   │
//! │  ├── DbError       - Storage failures                               │
//! │  └── EngineError   - Full engine boundary (wraps CoreError,         │
//! │                      adds InsufficientStock, Contention, ...)       │
//! │                                                                     │
//! │  Flow: CoreError → EngineError → caller                             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. `thiserror` derive macros, never manual Display impls
//! 2. Context in every message (quantity, limit, ...)
//! 3. Errors are enum variants, never bare Strings

use thiserror::Error;

/// Pure business rule violations.
///
/// Everything here is decidable from the inputs alone; checks that need
/// ledger state (insufficient stock, missing product) live in the engine's
/// error type in `atlas-db`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Quantity is zero or negative.
    ///
    /// Every stock movement (receive, transfer, sale line) must move a
    /// strictly positive amount; the sign is carried by the movement type.
    #[error("Quantity must be positive, got {requested}")]
    InvalidQuantity { requested: i64 },

    /// Quantity exceeds the per-movement ceiling.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Transfer source and destination are the same branch.
    #[error("Source and destination branch must differ")]
    SameBranchTransfer,

    /// Checkout called with no items.
    #[error("Cart is empty")]
    EmptyCart,

    /// Checkout called with more line items than allowed.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// A line total or cart total overflowed i64 cents.
    ///
    /// Practically unreachable with the quantity ceiling in place, but the
    /// arithmetic is checked rather than silently wrapping.
    #[error("Order total overflowed")]
    TotalOverflow,
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
