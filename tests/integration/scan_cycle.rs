//! Scan orchestrator scenarios against scripted marketplaces.

use chrono::TimeZone;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use dealscope::config::{DelayRange, ScannerConfig};
use dealscope::engine::clock::ManualClock;
use dealscope::engine::scanner::ScanOrchestrator;
use dealscope::events::{EventBus, ScanEvent, ScanPhase};
use dealscope::marketplaces::Marketplace;
use dealscope::types::{MarketplaceTarget, NewAgent, ScanError, ScanRecord, Source};

use crate::mock_marketplace::{listing, MemoryStore, MockMarketplace};

struct Harness {
    scanner: Arc<ScanOrchestrator>,
    kleinanzeigen: Arc<MockMarketplace>,
    vinted: Arc<MockMarketplace>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn config() -> ScannerConfig {
    ScannerConfig {
        inter_source_delay_ms: DelayRange::NONE,
        ..ScannerConfig::default()
    }
}

fn harness_with_store(store: Arc<MemoryStore>) -> Harness {
    let kleinanzeigen = MockMarketplace::new(Source::Kleinanzeigen);
    let vinted = MockMarketplace::new(Source::Vinted);
    let clock = Arc::new(ManualClock::new(
        chrono::Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap(),
    ));
    let sources: Vec<Arc<dyn Marketplace>> = vec![kleinanzeigen.clone(), vinted.clone()];
    let scanner = Arc::new(ScanOrchestrator::new(
        config(),
        sources,
        store.clone(),
        EventBus::new(128),
        clock.clone(),
    ));
    Harness {
        scanner,
        kleinanzeigen,
        vinted,
        store,
        clock,
    }
}

fn harness() -> Harness {
    harness_with_store(MemoryStore::with_agents(Vec::new()))
}

fn new_agent(query: &str, max_price: Option<Decimal>, marketplace: MarketplaceTarget) -> NewAgent {
    NewAgent {
        name: format!("Watch {query}"),
        query: query.to_string(),
        min_price: None,
        max_price,
        marketplace,
    }
}

fn new_listings(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanRecord> {
    let mut records = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ScanEvent::NewListing(record) = event {
            records.push(record);
        }
    }
    records
}

// ---------------------------------------------------------------------------
// Dedup and enrichment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_deal_reported_once_across_cycles() {
    let h = harness();
    let agent = h
        .scanner
        .add_agent(new_agent("iphone 15", Some(dec!(100)), MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();
    h.kleinanzeigen
        .set_listings(vec![listing(Source::Kleinanzeigen, 1, "80 €")]);
    let mut rx = h.scanner.subscribe();

    assert!(h.scanner.run_cycle().await);
    let records = new_listings(&mut rx);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].agent_id, agent.id);
    assert_eq!(records[0].item.price_value, Some(dec!(80)));
    assert!(records[0].item.is_deal);
    assert!(records[0].item.deal_reason.is_some());

    h.clock.advance(chrono::Duration::seconds(60));
    assert!(h.scanner.run_cycle().await);
    assert!(new_listings(&mut rx).is_empty());

    let stored = h.store.saved_agents();
    assert_eq!(stored[0].total_found, 1);
    assert!(stored[0].last_scan.is_some());
    // once on create, once per cycle
    assert_eq!(h.store.agent_saves(), 3);
    assert_eq!(h.kleinanzeigen.queries(), vec!["iphone 15", "iphone 15"]);
    assert_eq!(h.vinted.calls(), 0);
}

#[tokio::test]
async fn test_both_agent_scans_sources_in_order() {
    let h = harness();
    h.scanner
        .add_agent(new_agent("north face", Some(dec!(30)), MarketplaceTarget::Both))
        .await
        .unwrap();
    h.kleinanzeigen
        .set_listings(vec![listing(Source::Kleinanzeigen, 1, "45 € VB")]);
    h.vinted
        .set_listings(vec![listing(Source::Vinted, 1, "25.00 €")]);

    h.scanner.run_cycle().await;

    let history = h.scanner.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].item.listing.source, Source::Kleinanzeigen);
    assert!(!history[0].item.is_deal);
    assert_eq!(history[1].item.listing.source, Source::Vinted);
    assert!(history[1].item.is_deal);

    let stats = h.scanner.stats().await;
    assert_eq!(stats.total_items_found, 2);
    assert_eq!(stats.today_items_found, 2);
    assert_eq!(stats.active_agents, 1);
}

#[tokio::test]
async fn test_min_price_vetoes_suspiciously_cheap_items() {
    let h = harness();
    let mut draft = new_agent("ps5", Some(dec!(400)), MarketplaceTarget::Kleinanzeigen);
    draft.min_price = Some(dec!(150));
    h.scanner.add_agent(draft).await.unwrap();
    h.kleinanzeigen.set_listings(vec![
        listing(Source::Kleinanzeigen, 1, "20 €"),
        listing(Source::Kleinanzeigen, 2, "350 €"),
        listing(Source::Kleinanzeigen, 3, "VB"),
    ]);

    h.scanner.run_cycle().await;

    let deals: Vec<_> = h
        .scanner
        .history()
        .await
        .into_iter()
        .map(|r| (r.item.id().to_string(), r.item.is_deal))
        .collect();
    assert_eq!(
        deals,
        vec![
            ("kleinanzeigen-1".to_string(), false),
            ("kleinanzeigen-2".to_string(), true),
            ("kleinanzeigen-3".to_string(), false),
        ]
    );
}

// ---------------------------------------------------------------------------
// Single flight and cooldown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_flight() {
    let h = harness();
    h.scanner
        .add_agent(new_agent("lego", None, MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();
    let gate = h.kleinanzeigen.hold();

    let scanner = Arc::clone(&h.scanner);
    let running = tokio::spawn(async move { scanner.run_cycle().await });
    h.kleinanzeigen.entered().await;

    assert!(h.scanner.is_scanning());
    assert!(h.scanner.stats().await.is_scanning);
    assert_eq!(h.scanner.scan_on_demand().await.unwrap_err(), ScanError::Busy);
    assert!(!h.scanner.run_cycle().await);

    gate.notify_one();
    assert!(running.await.unwrap());
    assert!(!h.scanner.is_scanning());
    assert_eq!(h.kleinanzeigen.calls(), 1);
}

#[tokio::test]
async fn test_cooldown_after_cycle() {
    let h = harness();
    h.scanner.run_cycle().await;

    h.clock.advance(chrono::Duration::seconds(3));
    assert_eq!(
        h.scanner.scan_on_demand().await.unwrap_err(),
        ScanError::Cooldown { remaining_secs: 7 }
    );

    h.clock.advance(chrono::Duration::seconds(7));
    let mut rx = h.scanner.subscribe();
    h.scanner.scan_on_demand().await.unwrap();

    let phases: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            ScanEvent::ScanStatus { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(phases, vec![ScanPhase::Scanning, ScanPhase::Idle]);
}

// ---------------------------------------------------------------------------
// Agent lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_delete_purges_history() {
    let h = harness();
    let keep = h
        .scanner
        .add_agent(new_agent("rennrad", None, MarketplaceTarget::Vinted))
        .await
        .unwrap();
    let gone = h
        .scanner
        .add_agent(new_agent("lego", None, MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();
    h.vinted.set_listings(vec![listing(Source::Vinted, 1, "100 €")]);
    h.kleinanzeigen
        .set_listings(vec![listing(Source::Kleinanzeigen, 1, "10 €")]);
    h.scanner.run_cycle().await;
    assert_eq!(h.scanner.history().await.len(), 2);

    assert!(h.scanner.delete_agent(&gone.id).await);

    let history = h.scanner.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].agent_id, keep.id);
    assert_eq!(h.store.saved_agents().len(), 1);
}

#[tokio::test]
async fn test_agent_deleted_mid_cycle_not_credited() {
    let h = harness();
    let agent = h
        .scanner
        .add_agent(new_agent("lego", None, MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();
    h.kleinanzeigen
        .set_listings(vec![listing(Source::Kleinanzeigen, 1, "10 €")]);
    let gate = h.kleinanzeigen.hold();

    let scanner = Arc::clone(&h.scanner);
    let running = tokio::spawn(async move { scanner.run_cycle().await });
    h.kleinanzeigen.entered().await;

    h.scanner.delete_agent(&agent.id).await;
    gate.notify_one();
    running.await.unwrap();

    assert!(h.scanner.history().await.is_empty());
    assert_eq!(h.scanner.stats().await.total_items_found, 0);
    assert!(h.store.saved_agents().is_empty());
}

#[tokio::test]
async fn test_disabled_agent_not_scanned() {
    let h = harness();
    let agent = h
        .scanner
        .add_agent(new_agent("lego", None, MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();
    let toggled = h.scanner.toggle_agent(&agent.id).await.unwrap();
    assert!(!toggled.enabled);

    h.scanner.run_cycle().await;
    assert_eq!(h.kleinanzeigen.calls(), 0);
    assert_eq!(h.scanner.stats().await.active_agents, 0);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let h = harness();
    h.scanner
        .add_agent(new_agent("lego", None, MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();
    h.kleinanzeigen
        .set_listings(vec![listing(Source::Kleinanzeigen, 7, "10 €")]);
    h.scanner.run_cycle().await;

    let item = h.scanner.history().await[0].item.clone();
    h.scanner.add_favorite(item).await.unwrap();
    assert_eq!(h.store.saved_favorites().len(), 1);

    let restarted = harness_with_store(Arc::clone(&h.store));
    let agents = restarted.scanner.list_agents().await;
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].total_found, 1);

    // The seen set is not persisted, so the item comes back, flagged.
    restarted
        .kleinanzeigen
        .set_listings(vec![listing(Source::Kleinanzeigen, 7, "10 €")]);
    restarted.scanner.run_cycle().await;
    let history = restarted.scanner.history().await;
    assert_eq!(history.len(), 1);
    assert!(history[0].item.is_favorite);
}

// ---------------------------------------------------------------------------
// Periodic scheduling
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_periodic_scanning() {
    let h = harness();
    h.scanner
        .add_agent(new_agent("lego", None, MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();

    assert!(h.scanner.start());
    assert!(!h.scanner.start());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.kleinanzeigen.calls(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.kleinanzeigen.calls(), 2);

    h.scanner.stop();
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(h.kleinanzeigen.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_on_demand_scan_restarts_timer() {
    let h = harness();
    h.scanner
        .add_agent(new_agent("lego", None, MarketplaceTarget::Kleinanzeigen))
        .await
        .unwrap();

    h.scanner.start();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.kleinanzeigen.calls(), 1);

    h.clock.advance(chrono::Duration::seconds(30));
    h.scanner.scan_on_demand().await.unwrap();
    assert_eq!(h.kleinanzeigen.calls(), 2);

    // The periodic tick moved from t=60 to t=90.
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(h.kleinanzeigen.calls(), 2);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(h.kleinanzeigen.calls(), 3);

    h.scanner.stop();
}
