//! # Validation Module
//!
//! Input validation for the stock operation engine.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                              │
//! │                                                                     │
//! │  Layer 1: Caller (form / cart)                                      │
//! │  └── Basic format checks, immediate feedback                        │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 2: THIS MODULE - pure rule checks, before any transaction    │
//! │  └── Positive quantities, distinct branches, non-empty cart         │
//! │           │                                                         │
//! │           ▼                                                         │
//! │  Layer 3: Database (SQLite)                                         │
//! │  └── CHECK (quantity >= 0), UNIQUE, FOREIGN KEY constraints         │
//! │                                                                     │
//! │  Defense in depth: rejecting bad input here means the engine never  │
//! │  takes the write lock for a doomed operation.                       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::CheckoutItem;
use crate::{MAX_CART_ITEMS, MAX_MOVEMENT_QUANTITY};

/// Validates a movement quantity (receive, transfer, or sale line).
///
/// ## Rules
/// - Must be strictly positive (the sign belongs to the movement type)
/// - Must not exceed [`MAX_MOVEMENT_QUANTITY`]
///
/// ## Example
/// ```rust
/// use atlas_core::validation::validate_quantity;
///
/// assert!(validate_quantity(5).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(-3).is_err());
/// ```
pub fn validate_quantity(quantity: i64) -> CoreResult<()> {
    if quantity <= 0 {
        return Err(CoreError::InvalidQuantity {
            requested: quantity,
        });
    }

    if quantity > MAX_MOVEMENT_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested: quantity,
            max: MAX_MOVEMENT_QUANTITY,
        });
    }

    Ok(())
}

/// Validates the branch pair of a transfer.
///
/// Quantity validation is separate ([`validate_quantity`]); this only
/// rejects transfers from a branch to itself.
pub fn validate_transfer_branches(from_branch_id: &str, to_branch_id: &str) -> CoreResult<()> {
    if from_branch_id == to_branch_id {
        return Err(CoreError::SameBranchTransfer);
    }
    Ok(())
}

/// Validates a checkout item list.
///
/// ## Rules
/// - Must not be empty
/// - Must not exceed [`MAX_CART_ITEMS`] lines
/// - Every line quantity must pass [`validate_quantity`]
pub fn validate_checkout(items: &[CheckoutItem]) -> CoreResult<()> {
    if items.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    if items.len() > MAX_CART_ITEMS {
        return Err(CoreError::CartTooLarge {
            max: MAX_CART_ITEMS,
        });
    }

    for item in items {
        validate_quantity(item.quantity)?;
    }

    Ok(())
}
