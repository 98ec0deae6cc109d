//! Deduplication and enrichment.
//!
//! Every listing an adapter returns passes through [`enrich`]: identifiers
//! already in the [`SeenSet`] are dropped, new ones are marked seen and
//! get a numeric price, a deal classification and the favorite flag.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

use crate::engine::favorites::FavoriteBook;
use crate::types::{Agent, EnrichedItem, Listing};

// ---------------------------------------------------------------------------
// Price parsing
// ---------------------------------------------------------------------------

/// Parse a displayed price into a number.
///
/// Everything except digits, `,` and `.` is stripped first, so currency
/// symbols and suffixes like "VB" disappear. German formatting
/// (`1.200,50`) is normalised: dots are thousands separators and the
/// comma is the decimal mark. Without a comma, a dot followed by exactly
/// three digits in every group is a thousands separator (`1.200`),
/// otherwise it is a decimal point (`5.00`). Returns `None` when no
/// number remains.
///
/// ```
/// use dealscope::engine::enricher::parse_price;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(parse_price("150 € VB"), Some(dec!(150)));
/// assert_eq!(parse_price("1.200,50 €"), Some(dec!(1200.50)));
/// assert_eq!(parse_price("VB"), None);
/// ```
pub fn parse_price(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == ',' || c == '.');
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        // 1,200.50
        (Some(dot), Some(comma)) if dot > comma => cleaned.replace(',', ""),
        // 1.200,50 / 12,50
        (_, Some(comma)) => {
            let (int_part, frac_part) = cleaned.split_at(comma);
            let int_part: String = int_part.chars().filter(char::is_ascii_digit).collect();
            format!("{int_part}.{}", &frac_part[1..])
        }
        (Some(_), None) => {
            let mut groups = cleaned.split('.');
            let head = groups.next().unwrap_or_default();
            let tail: Vec<&str> = groups.collect();
            if tail.iter().all(|g| g.len() == 3) {
                format!("{head}{}", tail.concat())
            } else if tail.len() == 1 {
                cleaned.to_string()
            } else {
                return None;
            }
        }
        (None, None) => cleaned.to_string(),
    };

    Decimal::from_str(&normalized).ok()
}

// ---------------------------------------------------------------------------
// Deal classification
// ---------------------------------------------------------------------------

/// Classify a price against an agent's bounds.
///
/// A price at or below `max` is a deal. A `min` then vetoes anything
/// priced below it, whatever `max` said. Without a numeric price there is
/// never a deal.
pub fn classify_deal(
    price: Option<Decimal>,
    min: Option<Decimal>,
    max: Option<Decimal>,
) -> (bool, Option<String>) {
    let Some(price) = price else {
        return (false, None);
    };

    let mut verdict = match max {
        Some(max) if price <= max => (true, Some(format!("{price} is within max price {max}"))),
        _ => (false, None),
    };

    if let Some(min) = min {
        if price < min {
            verdict = (false, None);
        }
    }

    verdict
}

// ---------------------------------------------------------------------------
// Seen set
// ---------------------------------------------------------------------------

/// Every item identifier observed so far, with when it was first seen.
///
/// Without a retention window entries are kept for the life of the
/// process. With one, identifiers older than the window are forgotten and
/// may be reported again.
#[derive(Debug, Default)]
pub struct SeenSet {
    first_seen: HashMap<String, DateTime<Utc>>,
    retention: Option<chrono::Duration>,
}

impl SeenSet {
    pub fn new(retention: Option<chrono::Duration>) -> Self {
        Self {
            first_seen: HashMap::new(),
            retention,
        }
    }

    fn is_live(&self, seen_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.retention.map_or(true, |window| now - seen_at < window)
    }

    pub fn contains(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.first_seen
            .get(id)
            .is_some_and(|seen_at| self.is_live(*seen_at, now))
    }

    /// Mark `id` as seen. Returns `true` if it was not already seen.
    pub fn insert(&mut self, id: &str, now: DateTime<Utc>) -> bool {
        if self.contains(id, now) {
            return false;
        }
        self.first_seen.insert(id.to_string(), now);
        true
    }

    /// Drop identifiers that fell out of the retention window.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(window) = self.retention else {
            return 0;
        };
        let before = self.first_seen.len();
        self.first_seen.retain(|_, seen_at| now - *seen_at < window);
        before - self.first_seen.len()
    }

    pub fn len(&self) -> usize {
        self.first_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_seen.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Dedup and enrich one listing for `agent`.
///
/// Returns `None` if the identifier was already seen. Otherwise marks it
/// seen and returns the enriched item.
pub fn enrich(
    listing: Listing,
    seen: &mut SeenSet,
    agent: &Agent,
    favorites: &FavoriteBook,
    now: DateTime<Utc>,
) -> Option<EnrichedItem> {
    if !seen.insert(&listing.id, now) {
        return None;
    }

    let price_value = parse_price(&listing.price);
    let (is_deal, deal_reason) = classify_deal(price_value, agent.min_price, agent.max_price);
    let is_favorite = favorites.contains(&listing.id);

    Some(EnrichedItem {
        listing,
        price_value,
        is_deal,
        deal_reason,
        is_favorite,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
