//! Scan orchestrator.
//!
//! Owns the agents, the seen set, the recent buffer and the favorites, and
//! runs scan cycles over the enabled marketplaces. A cycle is single-flight:
//! a periodic tick that arrives while one is running is skipped, and an
//! on-demand request is refused with [`ScanError::Busy`]. On-demand scans
//! are further rate-limited by a cooldown measured from the end of the
//! previous cycle.
//!
//! Shared state lives behind one async mutex that is only held for
//! bookkeeping, never across a network call.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::ScannerConfig;
use crate::engine::clock::Clock;
use crate::engine::enricher::{enrich, SeenSet};
use crate::engine::favorites::FavoriteBook;
use crate::engine::recent::RecentBuffer;
use crate::engine::scheduler::Scheduler;
use crate::engine::stats::{CycleSummary, DailyCounter};
use crate::events::{AgentAction, EventBus, ScanEvent, ScanPhase};
use crate::marketplaces::{random_delay, Marketplace};
use crate::storage::Store;
use crate::types::{
    Agent, AgentError, AgentPatch, EnrichedItem, Favorite, FavoriteError, Listing, NewAgent,
    ScanError, ScanRecord, Source, Stats,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct ScanState {
    agents: Vec<Agent>,
    seen: SeenSet,
    recent: RecentBuffer,
    favorites: FavoriteBook,
    total_found: u64,
    today: DailyCounter,
    last_scan: Option<DateTime<Utc>>,
}

/// Clears the scanning flag when dropped, including on unwind.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct ScanOrchestrator {
    config: ScannerConfig,
    sources: Vec<Arc<dyn Marketplace>>,
    store: Arc<dyn Store>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    scanning: AtomicBool,
    started_at: DateTime<Utc>,
    state: Mutex<ScanState>,
}

impl ScanOrchestrator {
    /// Build the orchestrator and load persisted agents and favorites.
    ///
    /// A store that fails to load is logged and treated as empty.
    pub fn new(
        config: ScannerConfig,
        sources: Vec<Arc<dyn Marketplace>>,
        store: Arc<dyn Store>,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let agents = store.load_agents().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load agents, starting with none");
            Vec::new()
        });
        let favorites = store.load_favorites().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load favorites, starting with none");
            Vec::new()
        });

        let enabled: Vec<Source> = sources.iter().map(|s| s.source()).collect();
        info!(
            agents = agents.len(),
            favorites = favorites.len(),
            sources = ?enabled,
            "Scanner initialised"
        );

        let state = ScanState {
            agents,
            seen: SeenSet::new(config.seen_retention()),
            recent: RecentBuffer::new(config.recent_capacity),
            favorites: FavoriteBook::from_entries(favorites),
            total_found: 0,
            today: DailyCounter::new(clock.today()),
            last_scan: None,
        };

        Self {
            scheduler: Scheduler::new(config.scan_interval()),
            started_at: clock.now(),
            config,
            sources,
            store,
            events,
            clock,
            scanning: AtomicBool::new(false),
            state: Mutex::new(state),
        }
    }

    // -- Lifecycle -------------------------------------------------------

    /// Start periodic scanning. The first cycle runs immediately.
    /// Returns `false` if already started.
    pub fn start(self: &Arc<Self>) -> bool {
        let weak = Arc::downgrade(self);
        self.scheduler.start(move || {
            let weak = weak.clone();
            async move {
                if let Some(scanner) = weak.upgrade() {
                    scanner.run_cycle().await;
                }
            }
        })
    }

    /// Stop periodic scanning. A cycle already running finishes.
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    // -- Cycles ----------------------------------------------------------

    /// Run one cycle unless one is already running. Returns whether it ran.
    pub async fn run_cycle(&self) -> bool {
        let Some(flight) = self.try_begin() else {
            debug!("Cycle already in progress, skipping tick");
            return false;
        };
        self.fly(flight).await;
        true
    }

    /// User-triggered scan. Refused while a cycle runs or during the
    /// cooldown after the last one. On success the periodic timer restarts.
    pub async fn scan_on_demand(&self) -> Result<CycleSummary, ScanError> {
        if self.is_scanning() {
            return Err(ScanError::Busy);
        }
        if let Some(remaining_secs) = self.cooldown_remaining().await {
            debug!(remaining_secs, "On-demand scan refused, cooldown active");
            return Err(ScanError::Cooldown { remaining_secs });
        }
        let flight = self.try_begin().ok_or(ScanError::Busy)?;

        info!("On-demand scan triggered");
        self.scheduler.reset();
        Ok(self.fly(flight).await)
    }

    fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard(&self.scanning))
    }

    /// Whole seconds until an on-demand scan is allowed, rounded up.
    async fn cooldown_remaining(&self) -> Option<u64> {
        let last = self.state.lock().await.last_scan?;
        let cooldown = self.config.cooldown();
        let remaining = cooldown - (self.clock.now() - last);
        if remaining <= chrono::Duration::zero() {
            return None;
        }
        let secs = (remaining.num_milliseconds() + 999) / 1000;
        Some(secs.max(1) as u64)
    }

    async fn fly(&self, flight: FlightGuard<'_>) -> CycleSummary {
        let summary = self.execute_cycle().await;
        drop(flight);

        let stats = self.stats().await;
        self.events.emit(ScanEvent::ScanStatus {
            status: ScanPhase::Idle,
            timestamp: self.clock.now(),
            stats: Some(stats),
        });
        summary
    }

    async fn execute_cycle(&self) -> CycleSummary {
        let started = Instant::now();
        let now = self.clock.now();
        self.events.emit(ScanEvent::ScanStatus {
            status: ScanPhase::Scanning,
            timestamp: now,
            stats: None,
        });

        let agents: Vec<Agent> = {
            let mut state = self.state.lock().await;
            let evicted = state.seen.evict_expired(now);
            if evicted > 0 {
                debug!(evicted, "Expired seen identifiers dropped");
            }
            state.agents.iter().filter(|a| a.enabled).cloned().collect()
        };
        info!(agents = agents.len(), "Scan cycle started");

        let mut summary = CycleSummary::default();
        for agent in &agents {
            let listings = self.fetch_for_agent(agent).await;
            summary.listings_fetched += listings.len();

            let (new_items, deals) = self.ingest(agent, listings).await;
            summary.agents_scanned += 1;
            summary.new_items += new_items;
            summary.deals += deals;
        }

        {
            let mut state = self.state.lock().await;
            state.last_scan = Some(self.clock.now());
            self.persist_agents(&state.agents);
        }

        summary.elapsed = started.elapsed();
        info!(
            agents = summary.agents_scanned,
            fetched = summary.listings_fetched,
            new_items = summary.new_items,
            deals = summary.deals,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Scan cycle complete"
        );
        summary
    }

    fn adapter(&self, source: Source) -> Option<&Arc<dyn Marketplace>> {
        self.sources.iter().find(|m| m.source() == source)
    }

    /// Query every marketplace the agent targets, in order, with a random
    /// pause between consecutive marketplaces.
    async fn fetch_for_agent(&self, agent: &Agent) -> Vec<Listing> {
        let mut listings = Vec::new();
        let mut queried_any = false;

        for source in agent.marketplace.sources() {
            let Some(adapter) = self.adapter(*source) else {
                debug!(agent = %agent.name, %source, "Marketplace disabled, skipping");
                continue;
            };
            if queried_any {
                random_delay(self.config.inter_source_delay_ms).await;
            }
            queried_any = true;

            let fetched = AssertUnwindSafe(adapter.fetch_listings(&agent.query))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    error!(%source, query = %agent.query, "Marketplace adapter panicked");
                    Vec::new()
                });
            debug!(agent = %agent.name, %source, count = fetched.len(), "Listings fetched");
            listings.extend(fetched);
        }

        listings
    }

    /// Dedup, enrich and record one agent's listings. Returns
    /// `(new_items, deals)`. Results for an agent deleted while its fetch
    /// was in flight are dropped.
    async fn ingest(&self, scanned: &Agent, listings: Vec<Listing>) -> (u64, u64) {
        let now = self.clock.now();
        let today = self.clock.today();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let Some(agent) = state.agents.iter().find(|a| a.id == scanned.id).cloned() else {
            debug!(agent_id = %scanned.id, "Agent deleted during cycle, results dropped");
            return (0, 0);
        };

        let mut new_items = 0;
        let mut deals = 0;
        for listing in listings {
            let Some(item) = enrich(listing, &mut state.seen, &agent, &state.favorites, now) else {
                continue;
            };
            new_items += 1;
            if item.is_deal {
                deals += 1;
                info!(
                    agent = %agent.name,
                    title = %item.listing.title,
                    price = %item.listing.price,
                    "Deal found"
                );
            }

            let record = ScanRecord {
                agent_id: agent.id.clone(),
                agent_name: agent.name.clone(),
                item,
            };
            state.recent.push(record.clone());
            self.events.emit(ScanEvent::NewListing(record));
        }

        state.total_found += new_items;
        state.today.add(new_items, today);
        if let Some(stored) = state.agents.iter_mut().find(|a| a.id == agent.id) {
            stored.total_found += new_items;
            stored.last_scan = Some(now);
        }

        if new_items > 0 {
            info!(agent = %agent.name, new_items, deals, "New items found");
        }
        (new_items, deals)
    }

    // -- Read side -------------------------------------------------------

    pub async fn stats(&self) -> Stats {
        let today = self.clock.today();
        let mut state = self.state.lock().await;
        Stats {
            active_agents: state.agents.iter().filter(|a| a.enabled).count(),
            total_agents: state.agents.len(),
            total_items_found: state.total_found,
            today_items_found: state.today.get(today),
            uptime_ms: (self.clock.now() - self.started_at).num_milliseconds(),
            last_scan: state.last_scan,
            is_scanning: self.is_scanning(),
            favorite_count: state.favorites.len(),
        }
    }

    /// The recent buffer, oldest first.
    pub async fn history(&self) -> Vec<ScanRecord> {
        self.state.lock().await.recent.history()
    }

    // -- Agents ----------------------------------------------------------

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.state.lock().await.agents.clone()
    }

    pub async fn add_agent(&self, draft: NewAgent) -> Result<Agent, AgentError> {
        draft.validate()?;
        let agent = Agent::new(draft, self.clock.now());

        {
            let mut state = self.state.lock().await;
            state.agents.push(agent.clone());
            self.persist_agents(&state.agents);
        }

        info!(
            agent_id = %agent.id,
            name = %agent.name,
            query = %agent.query,
            marketplace = %agent.marketplace,
            "Agent created"
        );
        self.emit_agent(AgentAction::Added, &agent);
        Ok(agent)
    }

    pub async fn update_agent(&self, id: &str, patch: AgentPatch) -> Result<Agent, AgentError> {
        patch.validate()?;

        let updated = {
            let mut state = self.state.lock().await;
            let agent = state
                .agents
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AgentError::NotFound(id.to_string()))?;
            agent.apply(patch);
            let updated = agent.clone();
            self.persist_agents(&state.agents);
            updated
        };

        info!(agent_id = %updated.id, name = %updated.name, "Agent updated");
        self.emit_agent(AgentAction::Updated, &updated);
        Ok(updated)
    }

    /// Flip the enabled flag.
    pub async fn toggle_agent(&self, id: &str) -> Result<Agent, AgentError> {
        let toggled = {
            let mut state = self.state.lock().await;
            let agent = state
                .agents
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| AgentError::NotFound(id.to_string()))?;
            agent.enabled = !agent.enabled;
            let toggled = agent.clone();
            self.persist_agents(&state.agents);
            toggled
        };

        info!(agent_id = %toggled.id, enabled = toggled.enabled, "Agent toggled");
        self.emit_agent(AgentAction::Toggled, &toggled);
        Ok(toggled)
    }

    /// Remove an agent and its entries in the recent buffer. Its seen
    /// identifiers stay seen. Returns whether the agent existed.
    pub async fn delete_agent(&self, id: &str) -> bool {
        let (existed, purged) = {
            let mut state = self.state.lock().await;
            let before = state.agents.len();
            state.agents.retain(|a| a.id != id);
            let existed = state.agents.len() != before;
            let purged = state.recent.remove_agent(id);
            if existed {
                self.persist_agents(&state.agents);
            }
            (existed, purged)
        };

        if existed {
            info!(agent_id = id, purged, "Agent deleted");
            self.events.emit(ScanEvent::AgentUpdated {
                action: AgentAction::Deleted,
                agent_id: id.to_string(),
                agent: None,
            });
        }
        existed
    }

    // -- Favorites -------------------------------------------------------

    pub async fn list_favorites(&self) -> Vec<Favorite> {
        self.state.lock().await.favorites.entries().to_vec()
    }

    pub async fn add_favorite(&self, item: EnrichedItem) -> Result<Favorite, FavoriteError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let favorite = state.favorites.add(item, now)?;
        self.persist_favorites(state.favorites.entries());
        info!(item_id = %favorite.item.id(), title = %favorite.item.listing.title, "Favorite saved");
        Ok(favorite)
    }

    /// Removing an unknown id is a no-op. Returns whether anything changed.
    pub async fn remove_favorite(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.favorites.remove(id);
        if removed {
            self.persist_favorites(state.favorites.entries());
            info!(item_id = id, "Favorite removed");
        }
        removed
    }

    // -- Persistence -----------------------------------------------------

    fn persist_agents(&self, agents: &[Agent]) {
        if let Err(e) = self.store.save_agents(agents) {
            error!(error = %e, "Failed to save agents");
        }
    }

    fn persist_favorites(&self, favorites: &[Favorite]) {
        if let Err(e) = self.store.save_favorites(favorites) {
            error!(error = %e, "Failed to save favorites");
        }
    }

    fn emit_agent(&self, action: AgentAction, agent: &Agent) {
        self.events.emit(ScanEvent::AgentUpdated {
            action,
            agent_id: agent.id.clone(),
            agent: Some(agent.clone()),
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
