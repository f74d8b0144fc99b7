// Header handling: case-insensitive header set, default header derivation
// for embed URLs, and reduction to the minimal set mpv accepts.

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::errors::ExtractError;
use super::models::EmbedReference;

/// Desktop user agent sent with static fetches and probes
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:144.0) Gecko/20100101 Firefox/144.0";

/// Headers forwarded to the player, as (lookup key, display name), in flag order
pub const MINIMAL_HEADERS: [(&str, &str); 3] = [
    ("user-agent", "User-Agent"),
    ("origin", "Origin"),
    ("referer", "Referer"),
];

/// Providers whose embeds only play with their own canonical origin
const KNOWN_PROVIDERS: &[(&str, &str)] = &[("embedsports", "https://embedsports.top")];

/// Header map keyed by lowercase name.
///
/// All case folding happens in `insert`/`get`/`remove`, so call sites never
/// compare header names themselves. Iteration is sorted by folded name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: BTreeMap<String, String>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn fold(name: &str) -> String {
        name.trim().to_ascii_lowercase()
    }

    /// Insert or replace a header. Names differing only in case collapse.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries.insert(Self::fold(name.as_ref()), value.into());
    }

    /// Insert only when no header with this name exists yet
    pub fn insert_if_absent(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(Self::fold(name.as_ref()))
            .or_insert_with(|| value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&Self::fold(name)).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&Self::fold(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate as (lowercase name, value)
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Convert for use with reqwest, skipping names/values HTTP cannot carry
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in self.iter() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => tracing::debug!("skipping unsendable header {}", name),
            }
        }
        map
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut set = HeaderSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Compute default Origin/Referer/User-Agent for an embed URL.
///
/// Known providers get their canonical origin; anything else uses the URL's
/// own scheme and host.
pub fn derive_headers(embed_url: &str) -> Result<EmbedReference, ExtractError> {
    let trimmed = embed_url.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::EmptyInput("embed URL"));
    }

    let url = Url::parse(trimmed).map_err(|e| ExtractError::malformed(trimmed, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExtractError::malformed(
            trimmed,
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    let host = url
        .host_str()
        .ok_or_else(|| ExtractError::malformed(trimmed, "missing host"))?;

    let origin = KNOWN_PROVIDERS
        .iter()
        .find(|(marker, _)| host.contains(marker))
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| url.origin().ascii_serialization());

    Ok(EmbedReference {
        url: trimmed.to_string(),
        referer: format!("{}/", origin),
        origin,
        user_agent: DEFAULT_USER_AGENT.to_string(),
    })
}

/// Origin of a URL, or None when it has no tuple origin (e.g. data: URLs)
pub fn url_origin(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    match url.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}

/// Reduce a header set to User-Agent, Origin and Referer.
///
/// Empty values are dropped rather than forwarded; nothing is ever added.
pub fn normalize(raw: &HeaderSet) -> HeaderSet {
    let mut out = HeaderSet::new();
    for (lookup, display) in MINIMAL_HEADERS {
        if let Some(value) = raw.get(lookup) {
            if !value.trim().is_empty() {
                out.insert(display, value);
            }
        }
    }
    out
}
