//! DealScope: marketplace deal scanner.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the marketplace adapters and the scan orchestrator, starts the
//! periodic scanner and the dashboard, and shuts down on Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use dealscope::config;
use dealscope::dashboard;
use dealscope::engine::clock::SystemClock;
use dealscope::engine::scanner::ScanOrchestrator;
use dealscope::events::EventBus;
use dealscope::marketplaces::kleinanzeigen::KleinanzeigenClient;
use dealscope::marketplaces::vinted::VintedClient;
use dealscope::marketplaces::Marketplace;
use dealscope::storage::JsonStore;

const BANNER: &str = r#"
 ____             _ ____
|  _ \  ___  __ _| / ___|  ___ ___  _ __   ___
| | | |/ _ \/ _` | \___ \ / __/ _ \| '_ \ / _ \
| |_| |  __/ (_| | |___) | (_| (_) | |_) |  __/
|____/ \___|\__,_|_|____/ \___\___/| .__/ \___|
                                   |_|
  Kleinanzeigen + Vinted deal scanner
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::var("DEALSCOPE_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = config::AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        cooldown_secs = cfg.scanner.cooldown_secs,
        "DealScope starting up"
    );

    // -- Marketplaces ----------------------------------------------------

    let timeout = cfg.http.timeout();
    let mut sources: Vec<Arc<dyn Marketplace>> = Vec::new();

    if cfg.sources.kleinanzeigen.enabled {
        sources.push(Arc::new(KleinanzeigenClient::new(&cfg.sources.kleinanzeigen, timeout)?));
    } else {
        warn!("Kleinanzeigen disabled in config");
    }

    if cfg.sources.vinted.enabled {
        sources.push(Arc::new(VintedClient::new(&cfg.sources.vinted, timeout)?));
    } else {
        warn!("Vinted disabled in config");
    }

    // -- Orchestrator ----------------------------------------------------

    let store = Arc::new(JsonStore::from_config(&cfg.storage));
    let events = EventBus::new(cfg.scanner.event_capacity);
    let scanner = Arc::new(ScanOrchestrator::new(
        cfg.scanner.clone(),
        sources,
        store,
        events,
        Arc::new(SystemClock),
    ));

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(Arc::clone(&scanner), cfg.dashboard.port).await?;
    }

    scanner.start();
    info!(
        interval_secs = cfg.scanner.scan_interval_secs,
        "Scanner running. Press Ctrl+C to stop."
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping scanner");
    scanner.stop();

    let stats = scanner.stats().await;
    info!(
        total_items_found = stats.total_items_found,
        uptime_secs = stats.uptime_ms / 1000,
        "DealScope stopped"
    );
    Ok(())
}

/// Initialise tracing with env-filter support.
///
/// Set `RUST_LOG=dealscope=debug` for verbose output.
/// Set `DEALSCOPE_LOG_JSON=1` for JSON-formatted logs.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dealscope=info"));

    if std::env::var("DEALSCOPE_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
