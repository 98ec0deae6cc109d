//! Marketplace integrations.
//!
//! Defines the `Marketplace` trait and provides implementations for:
//! - Kleinanzeigen: HTML search results, public
//! - Vinted: JSON catalog API behind a cookie-issued bearer token
//!
//! Adapters never fail towards the scanner. Every problem is classified
//! into a [`FetchError`], logged, and turned into an empty result.

pub mod kleinanzeigen;
pub mod session;
pub mod vinted;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::StatusCode;
use tracing::{error, warn};

use crate::config::DelayRange;
use crate::types::{Listing, Source};

/// A marketplace that can be searched for listings.
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Search for `query`, newest first.
    ///
    /// Never fails: errors are logged and an empty list is returned.
    async fn fetch_listings(&self, query: &str) -> Vec<Listing>;

    /// Which marketplace this adapter talks to.
    fn source(&self) -> Source;
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a single adapter call. Stays inside the adapter.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("blocked (HTTP 403)")]
    Blocked,

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("authentication rejected (HTTP {0})")]
    AuthRejected(u16),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("no session: {0}")]
    NoSession(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else {
            FetchError::Transport(err)
        }
    }
}

/// Map a response status onto the error taxonomy. Success passes through.
pub fn check_status(status: StatusCode) -> Result<(), FetchError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::FORBIDDEN => Err(FetchError::Blocked),
        StatusCode::TOO_MANY_REQUESTS => Err(FetchError::RateLimited),
        s => Err(FetchError::Status(s.as_u16())),
    }
}

/// Log a fetch failure with a message specific to its class.
pub fn log_fetch_error(source: Source, query: &str, err: &FetchError) {
    match err {
        FetchError::Blocked => {
            warn!(%source, query, "Blocked (403), headers or request rate may be flagged")
        }
        FetchError::RateLimited => warn!(%source, query, "Rate limited (429)"),
        FetchError::AuthRejected(status) => {
            warn!(%source, query, status, "Auth rejected, session will be refreshed")
        }
        FetchError::Timeout => warn!(%source, query, "Request timed out"),
        other => error!(%source, query, error = %other, "Fetch failed"),
    }
}

// ---------------------------------------------------------------------------
// Request fingerprint helpers
// ---------------------------------------------------------------------------

/// Desktop browser identities rotated per request.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

pub fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Sleep for a random duration within `range`. A zero range returns at once.
pub async fn random_delay(range: DelayRange) {
    if range.max == 0 {
        return;
    }
    let ms = {
        let hi = range.max.max(range.min);
        rand::thread_rng().gen_range(range.min..=hi)
    };
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
