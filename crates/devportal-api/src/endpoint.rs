// Request URI construction
//
// Pure functions: no I/O, no connection state.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::error::Error;

/// Ordered query-string parameters for a portal call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryString {
    pairs: Vec<(String, String)>,
}

impl QueryString {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn push(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    /// Append a parameter only when a value is present.
    pub fn push_opt(self, key: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => self.push(key, v),
            None => self,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

impl<K, V> FromIterator<(K, V)> for QueryString
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K, V> From<&[(K, V)]> for QueryString
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fn from(pairs: &[(K, V)]) -> Self {
        pairs
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect()
    }
}

/// Build the full URI for an API call.
///
/// `api_path` is resolved relative to `base` (a base without a trailing
/// slash is treated as a directory, so `https://host/portal` + `api/os/info`
/// gives `https://host/portal/api/os/info`). Query pairs are form-URL-encoded;
/// an empty query yields a URI without a `?`.
pub fn build_endpoint(base: &Url, api_path: &str, query: &QueryString) -> Result<Url, Error> {
    let mut root = base.clone();
    root.set_query(None);
    root.set_fragment(None);
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }

    let mut url = root.join(api_path.trim_start_matches('/'))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.pairs());
    }
    Ok(url)
}

/// Base64 of the UTF-8 bytes, the encoding the portal expects for
/// application IDs and package names in query strings.
pub fn hex64_encode(value: &str) -> String {
    STANDARD.encode(value.as_bytes())
}
