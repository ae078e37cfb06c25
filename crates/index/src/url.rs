use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tabkeeper_protocol::TabSnapshot;
use url::Url;

/// Locations browsers show for a blank new tab. They parse fine on some
/// engines but must never be cached or deduplicated.
pub const NEW_TAB_URLS: &[&str] = &[
    "chrome://newtab/",
    "chrome-search://local-ntp/local-ntp.html",
    "edge://newtab/",
    "about:newtab",
    "about:home",
    "about:blank",
];

/// Parsed, canonical form of a tab location. `href` is the equality key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedUrl {
    pub scheme: String,
    pub host: String,
    pub path: String,
    /// Leading `?` included; empty when there is no query.
    pub query: String,
    /// Leading `#` included; empty when there is no fragment.
    pub fragment: String,
    pub href: String,
}

impl NormalizedUrl {
    /// Ordering used by the tab sorter: host, then path, then query, then
    /// fragment.
    #[must_use]
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        collate(&self.host, &other.host)
            .then_with(|| collate(&self.path, &other.path))
            .then_with(|| collate(&self.query, &other.query))
            .then_with(|| collate(&self.fragment, &other.fragment))
    }
}

fn has_web_scheme(location: &str) -> bool {
    location.split_once(':').is_some_and(|(scheme, _)| {
        scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
    })
}

/// Parse a location string, accepting only `http`/`https` pages.
#[must_use]
pub fn normalize(location: &str) -> Option<NormalizedUrl> {
    let trimmed = location.trim();
    if trimmed.is_empty() || NEW_TAB_URLS.contains(&trimmed) || !has_web_scheme(trimmed) {
        return None;
    }
    let parsed = Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let host = parsed.host_str()?.to_string();
    Some(NormalizedUrl {
        scheme: parsed.scheme().to_string(),
        host,
        path: parsed.path().to_string(),
        query: parsed
            .query()
            .filter(|q| !q.is_empty())
            .map(|q| format!("?{q}"))
            .unwrap_or_default(),
        fragment: parsed
            .fragment()
            .filter(|f| !f.is_empty())
            .map(|f| format!("#{f}"))
            .unwrap_or_default(),
        href: parsed.to_string(),
    })
}

/// The committed location wins whenever it qualifies on its own; the pending
/// location only fills in for tabs that are still navigating.
#[must_use]
pub fn resolve_tab_url(tab: &TabSnapshot) -> Option<NormalizedUrl> {
    tab.url
        .as_deref()
        .and_then(normalize)
        .or_else(|| tab.pending_url.as_deref().and_then(normalize))
}

/// Case-insensitive comparison with an exact tie-break, close to what a
/// browser's default locale collation does for URL components.
#[must_use]
pub fn collate(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}
