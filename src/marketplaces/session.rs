//! Cookie-issued session for marketplaces that gate their API.
//!
//! Vinted hands out an `access_token_web` cookie on the first visit to its
//! front page. That token, the rest of the cookies, and the user agent that
//! obtained them together form a [`Session`]. The manager caches one
//! session process-wide and drops it when the TTL runs out or when the
//! adapter reports an auth rejection.
//!
//! State machine:
//!
//! ```text
//! NoToken --(bootstrap ok)--> Valid(session, acquired_at)
//! Valid   --(ttl elapsed | invalidate())--> NoToken
//! ```

use reqwest::header::{
    HeaderMap, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, SET_COOKIE, UPGRADE_INSECURE_REQUESTS,
    USER_AGENT,
};
use reqwest::Client;
use regex::Regex;
use secrecy::SecretString;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{check_status, random_user_agent, FetchError};

/// Name of the cookie carrying the bearer token.
pub const TOKEN_COOKIE: &str = "access_token_web";

/// Credentials for authenticated API calls.
#[derive(Debug)]
pub struct Session {
    pub token: SecretString,
    /// `Cookie` header value: `name=value` pairs joined with `; `.
    pub cookies: String,
    /// The user agent that bootstrapped the session. API calls must reuse it.
    pub user_agent: String,
}

enum SessionState {
    NoToken,
    Valid {
        session: Arc<Session>,
        acquired_at: Instant,
    },
}

// ---------------------------------------------------------------------------
// Set-Cookie parsing
// ---------------------------------------------------------------------------

/// Output of [`parse_set_cookies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCookies {
    pub token: String,
    pub cookie_header: String,
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*access_token_web=([^;]*)").expect("valid regex")
    })
}

/// Extract the bearer token and a replayable cookie header from raw
/// `Set-Cookie` header values.
///
/// Each header contributes its leading `name=value` pair (attributes such
/// as `Path` or `Expires` are dropped). The token is the last non-empty
/// `access_token_web` value, so a later deletion cookie (`=;`) does not
/// clobber an earlier real one. Returns `None` if no token is present.
pub fn parse_set_cookies<'a, I>(headers: I) -> Option<ParsedCookies>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut pairs = Vec::new();
    let mut token = None;

    for header in headers {
        let pair = header.split(';').next().unwrap_or_default().trim();
        if !pair.is_empty() && pair.contains('=') {
            pairs.push(pair.to_string());
        }
        if let Some(caps) = token_pattern().captures(header) {
            let value = caps[1].trim();
            if !value.is_empty() {
                token = Some(value.to_string());
            }
        }
    }

    token.map(|token| ParsedCookies {
        token,
        cookie_header: pairs.join("; "),
    })
}

fn set_cookie_values(headers: &HeaderMap) -> Vec<&str> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Lazily acquires and caches one session.
pub struct SessionManager {
    http: Client,
    base_url: String,
    ttl: Duration,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(http: Client, base_url: impl Into<String>, ttl: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl,
            state: Mutex::new(SessionState::NoToken),
        }
    }

    /// Return the cached session, bootstrapping a new one if there is none
    /// or the cached one is older than the TTL.
    pub async fn get_valid_session(&self) -> Result<Arc<Session>, FetchError> {
        let mut state = self.state.lock().await;

        if let SessionState::Valid { session, acquired_at } = &*state {
            if acquired_at.elapsed() < self.ttl {
                return Ok(Arc::clone(session));
            }
            debug!(base_url = %self.base_url, "Session TTL elapsed");
        }
        *state = SessionState::NoToken;

        let session = Arc::new(self.acquire().await?);
        *state = SessionState::Valid {
            session: Arc::clone(&session),
            acquired_at: Instant::now(),
        };
        Ok(session)
    }

    /// Forget the cached session; the next call bootstraps a new one.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, SessionState::Valid { .. }) {
            info!(base_url = %self.base_url, "Session invalidated");
        }
        *state = SessionState::NoToken;
    }

    pub async fn has_session(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Valid { .. })
    }

    async fn acquire(&self) -> Result<Session, FetchError> {
        info!(base_url = %self.base_url, "Acquiring access token");
        let user_agent = random_user_agent().to_string();

        let resp = self
            .http
            .get(format!("{}/", self.base_url))
            .header(USER_AGENT, &user_agent)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "de-DE,de;q=0.9,en;q=0.5")
            .header(UPGRADE_INSECURE_REQUESTS, "1")
            .header(CACHE_CONTROL, "max-age=0")
            .header("DNT", "1")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "none")
            .header("Sec-Fetch-User", "?1")
            .send()
            .await?;

        check_status(resp.status())?;

        let Some(parsed) = parse_set_cookies(set_cookie_values(resp.headers())) else {
            warn!(base_url = %self.base_url, "No {TOKEN_COOKIE} cookie in bootstrap response");
            return Err(FetchError::NoSession(format!("{TOKEN_COOKIE} cookie missing")));
        };

        info!(base_url = %self.base_url, "Access token acquired");
        Ok(Session {
            token: SecretString::new(parsed.token),
            cookies: parsed.cookie_header,
            user_agent,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
