// Per-session connection state
//
// A `ConnectionContext` is created once per device session and owns the
// anti-forgery token. Only the transport writes the token, after each
// exchange with the portal.

use std::sync::{PoisonError, RwLock};

use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::{debug, trace};
use url::Url;

use crate::auth::{Credentials, Platform};
use crate::trust::TrustMode;

/// Cookie the portal uses to hand out the anti-forgery token.
pub const CSRF_COOKIE: &str = "CSRF-Token";

/// Header the token is echoed in on mutating requests.
pub const CSRF_HEADER: &str = "X-CSRF-Token";

/// Header some firmware uses to announce a rotated token.
pub const CSRF_UPDATED_HEADER: &str = "X-Updated-CSRF-Token";

// ── Token store ─────────────────────────────────────────────────────

/// Holds the latest anti-forgery token for a session.
///
/// A single value: every capture replaces the previous token.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<String>>,
}

impl TokenStore {
    /// The token to attach to the next mutating request.
    pub fn current(&self) -> Option<String> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Store a token, replacing any previous value.
    pub fn replace(&self, token: String) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Forget the token (e.g. when the session is torn down).
    pub fn clear(&self) {
        debug!("clearing anti-forgery token");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Capture a token from response headers, if one is present.
    ///
    /// Looks at `Set-Cookie: CSRF-Token=...` first, then the explicit token
    /// headers. Returns `true` when a token was stored.
    pub fn capture(&self, headers: &HeaderMap) -> bool {
        match token_from_headers(headers) {
            Some(token) => {
                let rotated = self.current().as_deref() != Some(token.as_str());
                if rotated {
                    trace!("anti-forgery token rotated");
                }
                self.replace(token);
                true
            }
            None => false,
        }
    }
}

fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(csrf_from_set_cookie)
        .next_back()
        .or_else(|| {
            headers
                .get(CSRF_UPDATED_HEADER)
                .or_else(|| headers.get(CSRF_HEADER))
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        })
}

/// Extract the token from one `Set-Cookie` value (`CSRF-Token=abc; Path=/`).
fn csrf_from_set_cookie(raw: &str) -> Option<String> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let value = value.trim().trim_matches('"');
    (name.trim() == CSRF_COOKIE && !value.is_empty()).then(|| value.to_owned())
}

// ── Connection context ──────────────────────────────────────────────

/// Everything the transport needs to talk to one device.
#[derive(Debug)]
pub struct ConnectionContext {
    base_url: Url,
    credentials: Option<Credentials>,
    trust: TrustMode,
    platform: Platform,
    tokens: TokenStore,
}

impl ConnectionContext {
    /// Create a context for the portal at `base_url`
    /// (e.g. `https://192.168.1.42` or `http://127.0.0.1:10080`).
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            credentials: None,
            trust: TrustMode::default(),
            platform: Platform::default(),
            tokens: TokenStore::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_trust(mut self, trust: TrustMode) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// The portal base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn trust(&self) -> &TrustMode {
        &self.trust
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The session's anti-forgery token store.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::header::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn captures_token_from_cookie() {
        let store = TokenStore::default();
        let captured = store.capture(&headers(&[
            ("set-cookie", "WMID=123; Path=/"),
            ("set-cookie", "CSRF-Token=abc123; Path=/; Secure"),
        ]));

        assert!(captured);
        assert_eq!(store.current().as_deref(), Some("abc123"));
    }

    #[test]
    fn captures_token_from_header() {
        let store = TokenStore::default();
        store.capture(&headers(&[("x-csrf-token", "from-header")]));
        assert_eq!(store.current().as_deref(), Some("from-header"));

        store.capture(&headers(&[("x-updated-csrf-token", "rotated")]));
        assert_eq!(store.current().as_deref(), Some("rotated"));
    }

    #[test]
    fn absent_token_keeps_previous_value() {
        let store = TokenStore::default();
        store.replace("kept".into());

        let captured = store.capture(&headers(&[
            ("set-cookie", "Other=1"),
            ("content-type", "text/plain"),
        ]));

        assert!(!captured);
        assert_eq!(store.current().as_deref(), Some("kept"));
    }

    #[test]
    fn empty_cookie_value_is_ignored() {
        assert_eq!(csrf_from_set_cookie("CSRF-Token=; Path=/"), None);
        assert_eq!(csrf_from_set_cookie("XCSRF-Token=abc"), None);
        assert_eq!(
            csrf_from_set_cookie("CSRF-Token=\"quoted\"; HttpOnly").as_deref(),
            Some("quoted")
        );
    }

    #[test]
    fn clear_forgets_token() {
        let store = TokenStore::default();
        store.replace("abc".into());
        store.clear();
        assert_eq!(store.current(), None);
    }

    #[test]
    fn context_defaults() {
        let ctx = ConnectionContext::new(Url::parse("https://10.0.0.5").unwrap());
        assert!(ctx.credentials().is_none());
        assert_eq!(ctx.platform(), Platform::Desktop);
        assert!(matches!(ctx.trust(), TrustMode::System));
        assert!(ctx.tokens().current().is_none());
    }
}
