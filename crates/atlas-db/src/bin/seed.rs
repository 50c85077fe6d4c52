//! # Seed Data Generator
//!
//! Populates a development database with branches, a small catalog, and
//! opening stock. Stock goes in through the engine, so the audit trail
//! replays correctly from day one.
//!
//! ## Usage
//! ```bash
//! cargo run -p atlas-db --bin seed
//! cargo run -p atlas-db --bin seed -- --db ./data/atlas.db
//! ```

use chrono::Utc;
use std::env;
use tracing::info;
use uuid::Uuid;

use atlas_core::{Branch, Identity, Product};
use atlas_db::{Database, DbConfig};

/// (name, price_cents, cost_cents, barcode, category, unit)
const PRODUCTS: &[(&str, i64, i64, &str, &str, &str)] = &[
    ("Drip Coffee 250g", 145, 90, "8850001000011", "Beverages", "bag"),
    ("Espresso Beans 1kg", 1800, 1200, "8850001000028", "Beverages", "bag"),
    ("Green Tea 20ct", 320, 180, "8850001000035", "Beverages", "box"),
    ("Sparkling Water 500ml", 95, 40, "8850001000042", "Beverages", "bottle"),
    ("Butter Croissant", 350, 150, "8850001000059", "Bakery", "piece"),
    ("Sourdough Loaf", 620, 280, "8850001000066", "Bakery", "loaf"),
    ("Whole Milk 1L", 210, 140, "8850001000073", "Dairy", "carton"),
    ("Greek Yogurt 150g", 180, 95, "8850001000080", "Dairy", "cup"),
    ("Filter Papers 100ct", 300, 120, "8850001000097", "Supplies", "box"),
    ("Paper Cups 50ct", 450, 220, "8850001000103", "Supplies", "pack"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let db_path = parse_db_path().unwrap_or_else(|| "./atlas.db".to_string());

    info!(path = %db_path, "Seeding database");
    let db = Database::new(DbConfig::new(&db_path)).await?;
    let catalog = db.catalog();
    let now = Utc::now();

    // Two branches, mirroring a typical small chain
    let branches = [
        ("branch-001", "Main Branch", "123 Main St"),
        ("branch-002", "Second Branch", "456 Second Rd"),
    ];
    for (id, name, location) in branches {
        catalog
            .insert_branch(&Branch {
                id: id.to_string(),
                name: name.to_string(),
                location: Some(location.to_string()),
                created_at: now,
            })
            .await?;
    }

    let seeder = Identity::new("seed");
    let engine = db.engine();

    for (name, price_cents, cost_price_cents, barcode, category, unit) in PRODUCTS {
        let product_id = Uuid::new_v4().to_string();
        catalog
            .insert_product(&Product {
                id: product_id.clone(),
                name: name.to_string(),
                price_cents: *price_cents,
                cost_price_cents: *cost_price_cents,
                barcode: Some(barcode.to_string()),
                category: Some(category.to_string()),
                unit: Some(unit.to_string()),
                image: None,
                created_at: now,
            })
            .await?;

        // Opening stock through the engine keeps the audit trail honest
        engine
            .receive(&product_id, "branch-001", 40, &seeder, Some("Opening stock"))
            .await?;
        engine
            .receive(&product_id, "branch-002", 15, &seeder, Some("Opening stock"))
            .await?;
    }

    info!(
        branches = branches.len(),
        products = PRODUCTS.len(),
        "Seed complete"
    );

    db.close().await;
    Ok(())
}

/// Parses `--db <path>` from the command line.
fn parse_db_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();
    args.iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .cloned()
}
