//! # atlas-db: Ledger Storage & Stock Operation Engine
//!
//! SQLite persistence and the transactional core of Atlas POS.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                       Atlas POS Data Flow                           │
//! │                                                                     │
//! │  Caller (POS checkout, stock intake, transfer form)                 │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                   atlas-db (THIS CRATE)                     │    │
//! │  │                                                             │    │
//! │  │   ┌────────────┐   ┌──────────────────┐   ┌─────────────┐   │    │
//! │  │   │  Database  │   │   StockEngine    │   │ Migrations  │   │    │
//! │  │   │ (pool.rs)  │──►│  Receive         │   │ (embedded)  │   │    │
//! │  │   │            │   │  Transfer        │   │             │   │    │
//! │  │   │ SqlitePool │   │  Sell            │   │ 001_init    │   │    │
//! │  │   └────────────┘   │  delete guards   │   └─────────────┘   │    │
//! │  │                    └────────┬─────────┘                     │    │
//! │  │                             │ one BEGIN IMMEDIATE tx        │    │
//! │  │   ┌─────────────────────────▼─────────────────────────┐     │    │
//! │  │   │ Repositories                                      │     │    │
//! │  │   │  inventory (ledger store)  stock_log (audit)      │     │    │
//! │  │   │  order (sales, write-once) catalog (lookups)      │     │    │
//! │  │   └───────────────────────────────────────────────────┘     │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │       │                                                             │
//! │       ▼                                                             │
//! │  SQLite database (WAL mode)                                         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atlas_db::{Database, DbConfig};
//! use atlas_core::Identity;
//!
//! let db = Database::new(DbConfig::new("./data/atlas.db")).await?;
//! let engine = db.engine();
//!
//! // Stock intake
//! let qty = engine.receive("P1", "B1", 24, &Identity::new("u-42"), None).await?;
//!
//! // Checkout
//! let summary = engine.sell(&cart_items, &Identity::at_branch("u-42", "B1")).await?;
//!
//! // Audit trail (read-only)
//! let recent = db.stock_logs().list(Some("B1"), 100).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use engine::{EngineError, EngineResult, StockEngine};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::inventory::InventoryRepository;
pub use repository::order::OrderRepository;
pub use repository::stock_log::StockLogRepository;
