//! Vinted integration.
//!
//! Uses the web catalog API (`/api/v2/catalog/items`), which requires the
//! bearer token Vinted sets as a cookie on its front page. Token handling
//! lives in [`SessionManager`]; this module only builds the search request
//! and maps catalog items onto [`Listing`].
//!
//! A 401/403 while holding a token invalidates the session, so the next
//! search bootstraps a fresh one. There is no retry within a single call.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION, COOKIE, REFERER, USER_AGENT};
use reqwest::{redirect, Client, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::session::SessionManager;
use super::{check_status, log_fetch_error, random_delay, FetchError, Marketplace};
use crate::config::{DelayRange, VintedConfig};
use crate::types::{Listing, Source};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const CATALOG_PATH: &str = "/api/v2/catalog/items";
const ID_PREFIX: &str = "vinted-";

// ---------------------------------------------------------------------------
// API response types (Vinted JSON → Rust)
// ---------------------------------------------------------------------------

/// Items are kept as raw JSON so one malformed entry only drops itself.
#[derive(Debug, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CatalogItem {
    id: u64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    price: Option<PriceField>,
    #[serde(default)]
    total_item_price: Option<PriceField>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country_title: Option<String>,
    /// Seconds since epoch.
    #[serde(default)]
    created_at_ts: Option<i64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    photo: Option<Photo>,
    #[serde(default)]
    photos: Vec<Photo>,
    #[serde(default)]
    brand_title: Option<String>,
    #[serde(default)]
    size_title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    user: Option<Seller>,
    /// Paid "bump" placement.
    #[serde(default)]
    promoted: bool,
}

/// Vinted has shipped prices as objects, strings and bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceField {
    Object {
        #[serde(default)]
        amount: Option<Amount>,
        #[serde(default)]
        currency_code: Option<String>,
    },
    Text(String),
    Number(f64),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Amount {
    Text(String),
    Number(f64),
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Amount::Text(s) => f.write_str(s),
            Amount::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Photo {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Seller {
    #[serde(default)]
    business: bool,
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

fn currency_symbol(code: Option<&str>) -> &str {
    match code {
        None | Some("EUR") => "€",
        Some(other) => other,
    }
}

/// Display text for a price, e.g. `"5.00 €"`.
fn format_price(price: &PriceField) -> String {
    match price {
        PriceField::Object {
            amount: Some(amount),
            currency_code,
        } => format!("{amount} {}", currency_symbol(currency_code.as_deref())),
        PriceField::Object { amount: None, .. } => String::new(),
        PriceField::Text(s) => s.clone(),
        PriceField::Number(n) => format!("{n} €"),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Map one catalog item. Returns `None` for items without a title and
/// for business sellers or promoted placements.
fn to_listing(item: CatalogItem, base_url: &str, captured_at: DateTime<Utc>) -> Option<Listing> {
    if item.promoted || item.user.as_ref().is_some_and(|u| u.business) {
        debug!(item_id = item.id, "Skipping promoted or business listing");
        return None;
    }

    let title = non_empty(item.title)?;

    let price = item
        .price
        .as_ref()
        .or(item.total_item_price.as_ref())
        .map(format_price)
        .unwrap_or_default();

    let created = item
        .created_at_ts
        .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0));
    let timestamp = created.unwrap_or(captured_at);
    let date = timestamp.with_timezone(&Local).format("%-d.%-m.%Y").to_string();

    let link = match non_empty(item.url) {
        Some(url) if url.starts_with("http") => url,
        Some(url) => format!("{base_url}{url}"),
        None => format!("{base_url}/items/{}", item.id),
    };

    let image = item
        .photo
        .and_then(|p| p.url)
        .or_else(|| item.photos.into_iter().find_map(|p| p.url))
        .filter(|u| !u.is_empty());

    let details: Vec<String> = [item.brand_title, item.size_title]
        .into_iter()
        .filter_map(non_empty)
        .collect();
    let description = if details.is_empty() {
        non_empty(item.description)
    } else {
        Some(details.join(" · "))
    };

    Some(Listing {
        id: format!("{ID_PREFIX}{}", item.id),
        title,
        price,
        location: non_empty(item.city)
            .or_else(|| non_empty(item.country_title))
            .unwrap_or_default(),
        date,
        link,
        image,
        description,
        timestamp,
        source: Source::Vinted,
    })
}

/// Parse a catalog response body into listings.
pub fn parse_catalog(body: &str, base_url: &str, captured_at: DateTime<Utc>) -> Result<Vec<Listing>, FetchError> {
    let resp: CatalogResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    Ok(resp
        .items
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<CatalogItem>(raw) {
            Ok(item) => to_listing(item, base_url, captured_at),
            Err(e) => {
                debug!(error = %e, "Dropping malformed catalog item");
                None
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Vinted marketplace client.
pub struct VintedClient {
    http: Client,
    base_url: String,
    delay: DelayRange,
    per_page: u32,
    session: SessionManager,
}

impl VintedClient {
    pub fn new(cfg: &VintedConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::limited(5))
            .build()
            .context("Failed to build HTTP client for Vinted")?;

        let base_url = cfg.base_url.trim_end_matches('/').to_string();
        let session = SessionManager::new(http.clone(), base_url.clone(), cfg.token_ttl());

        Ok(Self {
            http,
            base_url,
            delay: cfg.request_delay_ms,
            per_page: cfg.per_page,
            session,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    async fn search(&self, query: &str) -> Result<Vec<Listing>, FetchError> {
        let session = self.session.get_valid_session().await?;

        random_delay(self.delay).await;
        debug!(query, "Searching Vinted catalog");

        let per_page = self.per_page.to_string();
        let resp = self
            .http
            .get(format!("{}{CATALOG_PATH}", self.base_url))
            .query(&[
                ("search_text", query),
                ("order", "newest_first"),
                ("page", "1"),
                ("per_page", per_page.as_str()),
            ])
            .header(USER_AGENT, &session.user_agent)
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(ACCEPT_LANGUAGE, "de-DE,de;q=0.9")
            .header(AUTHORIZATION, format!("Bearer {}", session.token.expose_secret()))
            .header(COOKIE, &session.cookies)
            .header(
                REFERER,
                format!("{}/catalog?search_text={}", self.base_url, urlencoding::encode(query)),
            )
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-origin")
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.session.invalidate().await;
            return Err(FetchError::AuthRejected(status.as_u16()));
        }
        check_status(status)?;

        let body = resp.text().await?;
        parse_catalog(&body, &self.base_url, Utc::now())
    }
}

#[async_trait]
impl Marketplace for VintedClient {
    async fn fetch_listings(&self, query: &str) -> Vec<Listing> {
        match self.search(query).await {
            Ok(listings) => {
                info!(source = %Source::Vinted, query, count = listings.len(), "Listings fetched");
                listings
            }
            Err(e) => {
                log_fetch_error(Source::Vinted, query, &e);
                Vec::new()
            }
        }
    }

    fn source(&self) -> Source {
        Source::Vinted
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
