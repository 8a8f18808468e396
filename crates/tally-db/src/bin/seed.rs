//! # Seed Data Generator
//!
//! Populates a database with demo promotions, opening stock and one worked
//! checkout, for development.
//!
//! ## Usage
//! ```bash
//! # 20 products (default)
//! cargo run -p tally-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p tally-db --bin seed -- --products 200 --db ./data/tally.db
//! ```
//!
//! ## What Gets Created
//! - Three promotions: a 10% storewide, a $5.00 fixed, and an expired one
//! - One INITIAL_STOCK event per product (stock 0 - 100)
//! - One checkout: discount → card payment → settlement → SALE event

use chrono::{Duration, Utc};
use std::env;
use tally_core::ledger::StockMovement;
use tally_core::{
    DiscountType, InventoryChangeType, Money, NewPromotion, PaymentDraft, PaymentMethod,
    SettlementOutcome,
};
use tally_db::{Database, DbConfig};
use tracing_subscriber::EnvFilter;

/// Actor id used for everything the seeder writes.
const SEED_ACTOR: i64 = 1;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,tally_db=info,sqlx=warn")),
        )
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut products: i64 = 20;
    let mut db_path = String::from("./tally_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--products" | "-p" => {
                if i + 1 < args.len() {
                    products = args[i + 1].parse().unwrap_or(20);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --products <N> Number of stocked products (default: 20)");
                println!("  -d, --db <PATH>    Database file path (default: ./tally_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Tally Seed Data Generator");
    println!("============================");
    println!("Database: {}", db_path);
    println!("Products: {}", products);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.promotions().list_all().await?.len();
    if existing > 0 {
        println!("⚠ Database already has {} promotions", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Promotions
    let now = Utc::now();
    let storewide = db
        .promotions()
        .create(&NewPromotion {
            title: "Storewide 10% off".to_string(),
            description: Some("Everything, this month".to_string()),
            discount_type: DiscountType::Percentage,
            discount_value: 1000,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(30),
            is_active: true,
        })
        .await?;
    db.promotions()
        .create(&NewPromotion {
            title: "Five off".to_string(),
            description: None,
            discount_type: DiscountType::FixedAmount,
            discount_value: 500,
            start_date: now - Duration::days(1),
            end_date: now + Duration::days(7),
            is_active: true,
        })
        .await?;
    db.promotions()
        .create(&NewPromotion {
            title: "Last year's clearance".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discount_value: 2500,
            start_date: now - Duration::days(400),
            end_date: now - Duration::days(300),
            is_active: true,
        })
        .await?;
    println!("✓ Created 3 promotions");

    // Opening stock
    let start = std::time::Instant::now();
    for product_id in 1..=products {
        let opening = 1 + (product_id * 37) % 100;
        let movement = StockMovement::new(
            product_id,
            InventoryChangeType::InitialStock,
            opening,
            SEED_ACTOR,
            "Opening stock",
        )
        .system_generated();

        if let Err(e) = db.inventory().record(movement).await {
            eprintln!("Failed to stock product {}: {}", product_id, e);
        }
    }
    println!("✓ Stocked {} products in {:?}", products, start.elapsed());

    // One checkout, end to end
    println!();
    println!("Running a demo checkout...");

    let subtotal = Money::from_cents(4999);
    let discount = db
        .promotions()
        .apply_promotion(storewide.id, subtotal, Utc::now())
        .await?;
    let total = subtotal - discount;
    println!("  Subtotal {} - discount {} = {}", subtotal, discount, total);

    let draft = PaymentDraft::new(1001, SEED_ACTOR, total, PaymentMethod::Card).with_customer(42);
    let payment = db.payments().create(&draft).await?;
    let payment = db
        .payments()
        .settle(payment.id, &SettlementOutcome::approved())
        .await?;
    println!(
        "  Payment {} {} via {}",
        payment.transaction_reference, payment.status, payment.gateway
    );

    let sale = db
        .inventory()
        .record_sale(1, 2, SEED_ACTOR, "ORD-1001")
        .await?;
    println!(
        "  Product 1 stock {} -> {}",
        sale.previous_stock, sale.new_stock
    );

    // Summary
    println!();
    let summary = db
        .inventory()
        .activity_summary(now - Duration::minutes(1), Utc::now() + Duration::minutes(1))
        .await?;
    println!("Ledger summary:");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
