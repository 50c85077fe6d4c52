//! # Money Module
//!
//! Monetary values as integer cents.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                         │
//! │                                                                     │
//! │  In floating point:                                                 │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                              │
//! │                                                                     │
//! │  A sales order total that drifts by a cent is an audit failure.     │
//! │                                                                     │
//! │  OUR SOLUTION: i64 cents everywhere. 145 cents × 3 = 435 cents,     │
//! │  exactly, forever. Historical order totals never change.            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: room for totals far beyond any single register
/// - **Tuple struct**: zero-cost wrapper over i64
/// - There is deliberately no constructor from `f64`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates money from cents. The only constructor.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the raw cents value.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Extended price for a line: unit price × quantity, checked.
    ///
    /// ## Errors
    /// `CoreError::TotalOverflow` if the multiplication overflows i64.
    pub fn extend(&self, quantity: i64) -> Result<Money, CoreError> {
        self.0
            .checked_mul(quantity)
            .map(Money)
            .ok_or(CoreError::TotalOverflow)
    }

    /// Checked addition, for accumulating cart totals.
    pub fn checked_add(&self, other: Money) -> Result<Money, CoreError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(CoreError::TotalOverflow)
    }
}

impl fmt::Display for Money {
    /// Formats as a decimal amount, e.g. `1099` cents → `10.99`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Computes the total for a list of (unit price, quantity) pairs, checked.
///
/// Used by the engine to price a checkout before it opens the transaction.
pub fn cart_total<I>(lines: I) -> Result<Money, CoreError>
where
    I: IntoIterator<Item = (Money, i64)>,
{
    let mut total = Money::zero();
    for (unit_price, quantity) in lines {
        total = total.checked_add(unit_price.extend(quantity)?)?;
    }
    Ok(total)
}
