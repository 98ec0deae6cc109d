//! Shared types for DealScope.
//!
//! These types form the data model used across all modules: saved search
//! agents, raw marketplace listings, enriched items, favorites and the
//! scanner statistics. Wire names are camelCase so the same structs can be
//! pushed to subscribers unchanged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Marketplaces
// ---------------------------------------------------------------------------

/// A concrete marketplace that produces listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Kleinanzeigen,
    Vinted,
}

impl Source {
    /// All known sources, in the fixed order used for "both" agents.
    pub const ALL: &'static [Source] = &[Source::Kleinanzeigen, Source::Vinted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Kleinanzeigen => "kleinanzeigen",
            Source::Vinted => "vinted",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which marketplace(s) an agent searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketplaceTarget {
    #[default]
    Kleinanzeigen,
    Vinted,
    Both,
}

impl MarketplaceTarget {
    /// Sources to query for this target, in invocation order.
    pub fn sources(&self) -> &'static [Source] {
        match self {
            MarketplaceTarget::Kleinanzeigen => &[Source::Kleinanzeigen],
            MarketplaceTarget::Vinted => &[Source::Vinted],
            MarketplaceTarget::Both => Source::ALL,
        }
    }
}

impl fmt::Display for MarketplaceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketplaceTarget::Kleinanzeigen => write!(f, "kleinanzeigen"),
            MarketplaceTarget::Vinted => write!(f, "vinted"),
            MarketplaceTarget::Both => write!(f, "both"),
        }
    }
}

impl std::str::FromStr for MarketplaceTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kleinanzeigen" => Ok(MarketplaceTarget::Kleinanzeigen),
            "vinted" => Ok(MarketplaceTarget::Vinted),
            "both" => Ok(MarketplaceTarget::Both),
            other => anyhow::bail!("Unknown marketplace: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// A saved search, scanned on every cycle while enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub marketplace: MarketplaceTarget,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_scan: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_found: u64,
}

fn default_enabled() -> bool {
    true
}

impl Agent {
    /// Build a fresh agent with a new identifier.
    pub fn new(draft: NewAgent, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: draft.name.trim().to_string(),
            query: draft.query.trim().to_string(),
            marketplace: draft.marketplace,
            min_price: draft.min_price,
            max_price: draft.max_price,
            enabled: true,
            created_at: now,
            last_scan: None,
            total_found: 0,
        }
    }

    /// Apply a partial update. The identifier is never touched.
    pub fn apply(&mut self, patch: AgentPatch) {
        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(query) = patch.query {
            self.query = query.trim().to_string();
        }
        if let Some(min) = patch.min_price {
            self.min_price = min;
        }
        if let Some(max) = patch.max_price {
            self.max_price = max;
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(marketplace) = patch.marketplace {
            self.marketplace = marketplace;
        }
    }

    #[cfg(test)]
    pub fn sample(id: &str, max_price: Option<Decimal>) -> Self {
        Agent {
            id: id.to_string(),
            name: format!("Agent {id}"),
            query: "iphone 15 pro".to_string(),
            marketplace: MarketplaceTarget::Kleinanzeigen,
            min_price: None,
            max_price,
            enabled: true,
            created_at: Utc::now(),
            last_scan: None,
            total_found: 0,
        }
    }
}

/// Input for creating an agent.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub marketplace: MarketplaceTarget,
}

impl NewAgent {
    /// Reject blank text fields and negative price bounds.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() || self.query.trim().is_empty() {
            return Err(AgentError::Invalid("name and query are required".into()));
        }
        check_bounds(self.min_price, self.max_price)
    }
}

/// Partial agent update. For the price bounds, an explicit `null` clears the
/// bound while an absent field leaves it unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub min_price: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_price: Option<Option<Decimal>>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub marketplace: Option<MarketplaceTarget>,
}

impl AgentPatch {
    pub fn validate(&self) -> Result<(), AgentError> {
        let blank = |s: &Option<String>| s.as_deref().is_some_and(|v| v.trim().is_empty());
        if blank(&self.name) || blank(&self.query) {
            return Err(AgentError::Invalid("name and query must not be empty".into()));
        }
        check_bounds(self.min_price.flatten(), self.max_price.flatten())
    }
}

fn check_bounds(min: Option<Decimal>, max: Option<Decimal>) -> Result<(), AgentError> {
    for bound in [min, max].into_iter().flatten() {
        if bound.is_sign_negative() {
            return Err(AgentError::Invalid(format!("price bound {bound} is negative")));
        }
    }
    Ok(())
}

fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// One listing as normalised by a marketplace adapter.
///
/// `id` is namespaced by source (`kleinanzeigen-…`, `vinted-…`) so
/// identifiers from different marketplaces never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: String,
    pub title: String,
    /// Price exactly as displayed, e.g. "1.200,50 € VB".
    pub price: String,
    pub location: String,
    pub date: String,
    pub link: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
}

impl Listing {
    #[cfg(test)]
    pub fn sample(id: &str, price: &str) -> Self {
        Listing {
            id: id.to_string(),
            title: format!("Listing {id}"),
            price: price.to_string(),
            location: "10115 Berlin".to_string(),
            date: "Heute, 12:00".to_string(),
            link: format!("https://www.kleinanzeigen.de/s-anzeige/{id}"),
            image: None,
            description: None,
            timestamp: Utc::now(),
            source: Source::Kleinanzeigen,
        }
    }
}

/// A newly seen listing plus derived price, deal and favorite data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedItem {
    #[serde(flatten)]
    pub listing: Listing,
    pub price_value: Option<Decimal>,
    pub is_deal: bool,
    #[serde(default)]
    pub deal_reason: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl EnrichedItem {
    pub fn id(&self) -> &str {
        &self.listing.id
    }
}

/// An enriched item together with the agent that discovered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub agent_id: String,
    pub agent_name: String,
    pub item: EnrichedItem,
}

/// A saved item. At most one per item identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    #[serde(flatten)]
    pub item: EnrichedItem,
    pub saved_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Snapshot of scanner activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub active_agents: usize,
    pub total_agents: usize,
    pub total_items_found: u64,
    pub today_items_found: u64,
    pub uptime_ms: i64,
    pub last_scan: Option<DateTime<Utc>>,
    pub is_scanning: bool,
    pub favorite_count: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an on-demand scan was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("Cooldown active. Wait {remaining_secs}s.")]
    Cooldown { remaining_secs: u64 },

    #[error("Scan already in progress")]
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Invalid agent: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FavoriteError {
    #[error("Already in favorites: {0}")]
    AlreadyExists(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
