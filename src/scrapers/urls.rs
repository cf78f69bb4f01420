//! URL normalization used for deduplication across feeds, crawls and runs.

use url::Url;

/// Query parameter prefixes that only carry click tracking.
const TRACKING_PREFIXES: [&str; 3] = ["utm_", "fbclid", "gclid"];

/// Normalize an article URL so the same story is recognised across sources.
///
/// - tracking parameters (`utm_*`, `fbclid`, `gclid`) are dropped
/// - a leading `www.` is stripped from the host
/// - scheme, path, remaining query (in order) and fragment are kept
///
/// Input that does not parse as a URL is returned unchanged.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     normalize("https://www.example.com/a?utm_source=x&id=3"),
///     "https://example.com/a?id=3"
/// );
/// ```
pub fn normalize(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };

    if let Some(host) = url.host_str() {
        if let Some(stripped) = host.strip_prefix("www.") {
            let stripped = stripped.to_string();
            if url.set_host(Some(&stripped)).is_err() {
                return raw.to_string();
            }
        }
    }

    if url.query().is_some() {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !TRACKING_PREFIXES.iter().any(|p| k.starts_with(p)))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    url.to_string()
}

/// Resolve `href` against `base` and keep it only if it is an http(s) URL.
pub fn resolve_http(base: &Url, href: &str) -> Option<Url> {
    let resolved = base.join(href.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}
