//! # Settlement Daemon
//!
//! Runs the settlement worker against a database with the simulated
//! gateway until Ctrl-C.
//!
//! ## Usage
//! ```bash
//! # Config from the platform config dir (settlement.toml), if present
//! cargo run -p tally-settle --bin settle
//!
//! # Explicit config file
//! cargo run -p tally-settle --bin settle -- --config ./settlement.toml
//!
//! # Environment overrides win over the file
//! TALLY_DB_PATH=./tally_dev.db TALLY_SETTLE_SUCCESS_RATE=1.0 cargo run -p tally-settle --bin settle
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tally_db::{Database, DbConfig};
use tally_settle::{SettlementConfig, SettlementWorker, SimulatedGateway};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tally Settlement Daemon");
                println!();
                println!("Usage: settle [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH> settlement.toml to load");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = SettlementConfig::load(config_path)?;
    info!(
        db = %config.database.path.display(),
        success_rate = config.settlement.success_rate,
        "Starting settlement daemon"
    );

    let db = Database::new(DbConfig::new(&config.database.path)).await?;
    let gateway = SimulatedGateway::new(config.simulated_delay(), config.settlement.success_rate);
    let handle = SettlementWorker::spawn(db.clone(), Arc::new(config), Arc::new(gateway));

    tokio::signal::ctrl_c().await?;

    handle.shutdown().await?;
    db.close().await;

    Ok(())
}
