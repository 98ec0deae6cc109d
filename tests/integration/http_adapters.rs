//! Full pipeline: real adapters against mock HTTP servers, persisted to a
//! temporary directory.

use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dealscope::config::{DelayRange, KleinanzeigenConfig, ScannerConfig, VintedConfig};
use dealscope::engine::clock::SystemClock;
use dealscope::engine::scanner::ScanOrchestrator;
use dealscope::events::EventBus;
use dealscope::marketplaces::kleinanzeigen::KleinanzeigenClient;
use dealscope::marketplaces::vinted::VintedClient;
use dealscope::marketplaces::Marketplace;
use dealscope::storage::{JsonStore, Store};
use dealscope::types::{MarketplaceTarget, NewAgent};

fn scanner(sources: Vec<Arc<dyn Marketplace>>, dir: &TempDir) -> (ScanOrchestrator, JsonStore) {
    let store = JsonStore::new(dir.path().join("agents.json"), dir.path().join("favorites.json"));
    let config = ScannerConfig {
        inter_source_delay_ms: DelayRange::NONE,
        ..ScannerConfig::default()
    };
    let scanner = ScanOrchestrator::new(
        config,
        sources,
        Arc::new(store.clone()),
        EventBus::new(32),
        Arc::new(SystemClock),
    );
    (scanner, store)
}

fn ad(id: &str, classes: &str, title: &str, price: &str) -> String {
    format!(
        r#"<li class="ad-listitem">
          <article class="aditem {classes}" data-adid="{id}">
            <div class="aditem-main">
              <div class="aditem-main--top">
                <div class="aditem-main--top--left">80331 München</div>
                <div class="aditem-main--top--right">Gestern, 18:30</div>
              </div>
              <div class="aditem-main--middle">
                <h2 class="text-module-begin"><a href="/s-anzeige/{id}">{title}</a></h2>
                <p class="aditem-main--middle--price-shipping--price">{price}</p>
              </div>
            </div>
          </article>
        </li>"#
    )
}

#[tokio::test]
async fn test_kleinanzeigen_pipeline() {
    let server = MockServer::start().await;
    let page = format!(
        "<html><body><ul>{}{}{}</ul></body></html>",
        ad("111", "", "Lego Technic 42115", "45 €"),
        ad("999", "is-topad", "Gekaufte Anzeige", "1 €"),
        ad("222", "", "Lego Technic 42083", "1.200 € VB"),
    );
    Mock::given(method("GET"))
        .and(path("/s-lego-technic/k0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(page))
        .expect(2)
        .mount(&server)
        .await;

    let cfg = KleinanzeigenConfig {
        enabled: true,
        base_url: server.uri(),
        request_delay_ms: DelayRange::NONE,
    };
    let client = KleinanzeigenClient::new(&cfg, Duration::from_secs(5)).unwrap();
    let dir = TempDir::new().unwrap();
    let (scanner, store) = scanner(vec![Arc::new(client)], &dir);

    scanner
        .add_agent(NewAgent {
            name: "Technic".into(),
            query: "lego technic".into(),
            min_price: None,
            max_price: Some(dec!(50)),
            marketplace: MarketplaceTarget::Kleinanzeigen,
        })
        .await
        .unwrap();

    scanner.run_cycle().await;
    scanner.run_cycle().await;

    let history = scanner.history().await;
    let found: Vec<_> = history
        .iter()
        .map(|r| (r.item.id(), r.item.price_value, r.item.is_deal))
        .collect();
    assert_eq!(
        found,
        vec![
            ("kleinanzeigen-111", Some(dec!(45)), true),
            ("kleinanzeigen-222", Some(dec!(1200)), false),
        ]
    );
    assert_eq!(
        history[0].item.listing.link,
        format!("{}/s-anzeige/111", server.uri())
    );

    let saved = store.load_agents().unwrap();
    assert_eq!(saved[0].total_found, 2);
    assert!(saved[0].last_scan.is_some());
}

#[tokio::test]
async fn test_vinted_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "access_token_web=tok-e2e; Path=/; Secure"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/catalog/items"))
        .and(header("authorization", "Bearer tok-e2e"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": 501,
                    "title": "Carhartt Jacke",
                    "price": { "amount": "12.50", "currency_code": "EUR" },
                    "url": "https://www.vinted.de/items/501-carhartt-jacke",
                    "user": { "business": false }
                },
                {
                    "id": 502,
                    "title": "Shop Jacke",
                    "price": { "amount": "5.00", "currency_code": "EUR" },
                    "user": { "business": true }
                }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let cfg = VintedConfig {
        base_url: server.uri(),
        request_delay_ms: DelayRange::NONE,
        ..VintedConfig::default()
    };
    let client = VintedClient::new(&cfg, Duration::from_secs(5)).unwrap();
    let dir = TempDir::new().unwrap();
    let (scanner, _store) = scanner(vec![Arc::new(client)], &dir);

    scanner
        .add_agent(NewAgent {
            name: "Jacke".into(),
            query: "carhartt jacke".into(),
            min_price: None,
            max_price: Some(dec!(20)),
            marketplace: MarketplaceTarget::Vinted,
        })
        .await
        .unwrap();

    scanner.run_cycle().await;
    scanner.run_cycle().await;

    let history = scanner.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].item.id(), "vinted-501");
    assert_eq!(history[0].item.price_value, Some(dec!(12.50)));
    assert!(history[0].item.is_deal);
}

#[tokio::test]
async fn test_blocked_marketplace_yields_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let cfg = KleinanzeigenConfig {
        enabled: true,
        base_url: server.uri(),
        request_delay_ms: DelayRange::NONE,
    };
    let client = KleinanzeigenClient::new(&cfg, Duration::from_secs(5)).unwrap();
    let dir = TempDir::new().unwrap();
    let (scanner, _store) = scanner(vec![Arc::new(client)], &dir);
    scanner
        .add_agent(NewAgent {
            name: "x".into(),
            query: "anything".into(),
            min_price: None,
            max_price: None,
            marketplace: MarketplaceTarget::Both,
        })
        .await
        .unwrap();

    assert!(scanner.run_cycle().await);
    let stats = scanner.stats().await;
    assert_eq!(stats.total_items_found, 0);
    assert!(stats.last_scan.is_some());
}
