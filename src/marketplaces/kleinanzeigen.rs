//! Kleinanzeigen (formerly eBay Kleinanzeigen) integration.
//!
//! There is no public API, so results are scraped from the HTML search
//! page `/s-{query}/k0` (k0 = all categories). Each result is an
//! `article.aditem` carrying the ad id in `data-adid`.
//!
//! Promoted placements are dropped: top ads (class `is-topad`, the
//! `icon-feature-topad` badge, or no posting date at all) and commercial
//! "PRO" sellers. Only organic private listings are reported.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::{check_status, log_fetch_error, random_delay, random_user_agent, FetchError, Marketplace};
use crate::config::{DelayRange, KleinanzeigenConfig};
use crate::types::{Listing, Source};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const ID_PREFIX: &str = "kleinanzeigen-";

/// Class names marking paid top placements.
const TOP_AD_CLASSES: &[&str] = &["is-topad", "is-top-ad"];

/// Badge text prefix for commercial sellers ("Gewerblicher Anbieter").
const COMMERCIAL_PREFIX: &str = "gewerblich";

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

struct AdSelectors {
    item: Selector,
    title: Selector,
    price: Selector,
    location: Selector,
    date: Selector,
    image_box: Selector,
    image: Selector,
    description: Selector,
    top_badge: Selector,
    seller_badge: Selector,
}

fn selectors() -> &'static AdSelectors {
    static SELECTORS: OnceLock<AdSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let sel = |css: &str| Selector::parse(css).expect("valid selector");
        AdSelectors {
            item: sel(".aditem"),
            title: sel(".text-module-begin > a"),
            price: sel(".aditem-main--middle--price-shipping--price"),
            location: sel(".aditem-main--top--left"),
            date: sel(".aditem-main--top--right"),
            image_box: sel(".imagebox"),
            image: sel(".imagebox img"),
            description: sel(".aditem-main--middle--description"),
            top_badge: sel(".icon-feature-topad"),
            seller_badge: sel(".badge-hint-pro-small-srp, .simpletag"),
        }
    })
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Visible text of an element with whitespace runs collapsed.
fn clean_text(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn first_text(el: ElementRef<'_>, selector: &Selector) -> String {
    el.select(selector).next().map(clean_text).unwrap_or_default()
}

fn has_top_ad_class(el: ElementRef<'_>) -> bool {
    el.value().classes().any(|c| TOP_AD_CLASSES.contains(&c))
}

/// Whether an ad is a paid or commercial placement rather than an organic
/// private listing. Checks the ad itself and its list-item wrapper.
fn is_promoted(ad: ElementRef<'_>) -> bool {
    let s = selectors();
    if has_top_ad_class(ad) {
        return true;
    }
    if ad
        .ancestors()
        .filter_map(ElementRef::wrap)
        .take(2)
        .any(has_top_ad_class)
    {
        return true;
    }
    if ad.select(&s.top_badge).next().is_some() {
        return true;
    }
    ad.select(&s.seller_badge).any(|badge| {
        let text = clean_text(badge).to_lowercase();
        text == "pro" || text.starts_with(COMMERCIAL_PREFIX)
    })
}

fn absolute_url(base_url: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{base_url}{href}")
    } else {
        format!("{base_url}/{href}")
    }
}

/// Parse a search results page into listings, dropping promoted ads and
/// ads missing an id, title or posting date.
pub fn parse_listings(html: &str, base_url: &str, captured_at: DateTime<Utc>) -> Vec<Listing> {
    let s = selectors();
    let doc = Html::parse_document(html);
    let mut listings = Vec::new();

    for ad in doc.select(&s.item) {
        let Some(ad_id) = ad
            .value()
            .attr("data-adid")
            .map(str::trim)
            .filter(|id| !id.is_empty())
        else {
            continue;
        };

        if is_promoted(ad) {
            debug!(ad_id, "Skipping promoted ad");
            continue;
        }

        let title_link = ad.select(&s.title).next();
        let title = title_link.map(clean_text).unwrap_or_default();
        let date = first_text(ad, &s.date);
        if title.is_empty() || date.is_empty() {
            continue;
        }

        let link = title_link
            .and_then(|a| a.value().attr("href"))
            .map(|href| absolute_url(base_url, href))
            .unwrap_or_else(|| format!("{base_url}/s-anzeige/{ad_id}"));

        let image = ad
            .select(&s.image_box)
            .next()
            .and_then(|b| b.value().attr("data-imgsrc"))
            .or_else(|| {
                ad.select(&s.image)
                    .next()
                    .and_then(|img| img.value().attr("src"))
            })
            .filter(|src| !src.is_empty())
            .map(String::from);

        let description = Some(first_text(ad, &s.description)).filter(|d| !d.is_empty());

        listings.push(Listing {
            id: format!("{ID_PREFIX}{ad_id}"),
            title,
            price: first_text(ad, &s.price),
            location: first_text(ad, &s.location),
            date,
            link,
            image,
            description,
            timestamp: captured_at,
            source: Source::Kleinanzeigen,
        });
    }

    listings
}

/// Build the search URL: whitespace runs become `-`, every word is
/// percent-encoded.
pub fn search_url(base_url: &str, query: &str) -> String {
    let slug = query
        .split_whitespace()
        .map(|w| urlencoding::encode(w).into_owned())
        .collect::<Vec<_>>()
        .join("-");
    format!("{base_url}/s-{slug}/k0")
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Kleinanzeigen marketplace client.
pub struct KleinanzeigenClient {
    http: Client,
    base_url: String,
    delay: DelayRange,
}

impl KleinanzeigenClient {
    pub fn new(cfg: &KleinanzeigenConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for Kleinanzeigen")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            delay: cfg.request_delay_ms,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<Listing>, FetchError> {
        random_delay(self.delay).await;

        let url = search_url(&self.base_url, query);
        debug!(url = %url, "Fetching Kleinanzeigen search page");

        let resp = self
            .http
            .get(&url)
            .header(USER_AGENT, random_user_agent())
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "de,en-US;q=0.7,en;q=0.3")
            .header(REFERER, "https://www.google.com/")
            .send()
            .await?;

        check_status(resp.status())?;
        let body = resp.text().await?;

        Ok(parse_listings(&body, &self.base_url, Utc::now()))
    }
}

#[async_trait]
impl Marketplace for KleinanzeigenClient {
    async fn fetch_listings(&self, query: &str) -> Vec<Listing> {
        match self.search(query).await {
            Ok(listings) => {
                info!(source = %Source::Kleinanzeigen, query, count = listings.len(), "Listings fetched");
                listings
            }
            Err(e) => {
                log_fetch_error(Source::Kleinanzeigen, query, &e);
                Vec::new()
            }
        }
    }

    fn source(&self) -> Source {
        Source::Kleinanzeigen
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
