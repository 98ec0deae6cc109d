//! Mock marketplace and in-memory store for integration testing.
//!
//! `MockMarketplace` returns whatever listings the test puts into it and
//! can hold a fetch open until released, so tests can observe a cycle
//! mid-flight. `MemoryStore` keeps the durable lists in memory and counts
//! saves.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use dealscope::marketplaces::Marketplace;
use dealscope::storage::Store;
use dealscope::types::{Agent, Favorite, Listing, Source};

pub struct MockMarketplace {
    source: Source,
    listings: Mutex<Vec<Listing>>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
    entered: Notify,
}

impl MockMarketplace {
    pub fn new(source: Source) -> Arc<Self> {
        Arc::new(Self {
            source,
            listings: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
            entered: Notify::new(),
        })
    }

    pub fn set_listings(&self, listings: Vec<Listing>) {
        *self.listings.lock().unwrap() = listings;
    }

    /// Make the next fetches wait until the returned handle is notified.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Resolve once a fetch has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Marketplace for MockMarketplace {
    async fn fetch_listings(&self, query: &str) -> Vec<Listing> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        self.entered.notify_one();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.listings.lock().unwrap().clone()
    }

    fn source(&self) -> Source {
        self.source
    }
}

/// Build a listing the way an adapter would.
pub fn listing(source: Source, n: u32, price: &str) -> Listing {
    Listing {
        id: format!("{source}-{n}"),
        title: format!("Item {n}"),
        price: price.to_string(),
        location: "Berlin".to_string(),
        date: "Heute, 10:00".to_string(),
        link: format!("https://example.test/{source}/{n}"),
        image: None,
        description: None,
        timestamp: Utc::now(),
        source,
    }
}

#[derive(Default)]
pub struct MemoryStore {
    agents: Mutex<Vec<Agent>>,
    favorites: Mutex<Vec<Favorite>>,
    agent_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with_agents(agents: Vec<Agent>) -> Arc<Self> {
        Arc::new(Self {
            agents: Mutex::new(agents),
            ..Self::default()
        })
    }

    pub fn saved_agents(&self) -> Vec<Agent> {
        self.agents.lock().unwrap().clone()
    }

    pub fn saved_favorites(&self) -> Vec<Favorite> {
        self.favorites.lock().unwrap().clone()
    }

    pub fn agent_saves(&self) -> usize {
        self.agent_saves.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    fn load_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.saved_agents())
    }

    fn save_agents(&self, agents: &[Agent]) -> Result<()> {
        self.agent_saves.fetch_add(1, Ordering::SeqCst);
        *self.agents.lock().unwrap() = agents.to_vec();
        Ok(())
    }

    fn load_favorites(&self) -> Result<Vec<Favorite>> {
        Ok(self.saved_favorites())
    }

    fn save_favorites(&self, favorites: &[Favorite]) -> Result<()> {
        *self.favorites.lock().unwrap() = favorites.to_vec();
        Ok(())
    }
}
