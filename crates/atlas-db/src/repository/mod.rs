//! # Repository Module
//!
//! Repository implementations for the Atlas POS ledger.
//!
//! ## Transaction Scope Convention
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Two kinds of methods on every repository:                          │
//! │                                                                     │
//! │  fn xxx(&self, ...)              pool methods - single statement,   │
//! │                                  read paths, seeding                │
//! │                                                                     │
//! │  fn xxx(&self, conn, ...)        transaction methods - run on the   │
//! │                                  caller's connection, inside the    │
//! │                                  engine's BEGIN IMMEDIATE window    │
//! │                                                                     │
//! │  Repositories never open or commit transactions themselves; the    │
//! │  stock operation engine owns the transaction boundary.              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`inventory::InventoryRepository`] - the ledger store (per-branch quantities)
//! - [`stock_log::StockLogRepository`] - the audit recorder (append-only)
//! - [`order::OrderRepository`] - the order recorder (write-once sales)
//! - [`catalog::CatalogRepository`] - read-mostly product/branch lookups

pub mod catalog;
pub mod inventory;
pub mod order;
pub mod stock_log;
